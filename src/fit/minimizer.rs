//! Minimizer boundary.
//!
//! Consumes an `Objective` (parameter set → residual vector) and a
//! `ParameterSet`, varies the free parameters and returns a
//! `MinimizerResult`. Bounds are enforced through the MINUIT-style
//! transform into unbounded internal coordinates:
//!
//! ```text
//! [min, max]: x = min + (sin u + 1)(max - min)/2
//! [min, ∞):   x = min - 1 + √(u² + 1)
//! (-∞, max]:  x = max + 1 - √(u² + 1)
//! ```
//!
//! Two methods are available: Levenberg–Marquardt (`leastsq`, with
//! covariance) and Nelder–Mead (`nelder`, no uncertainties).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{DMatrix, DVector};

use crate::domain::FitMethod;
use crate::error::{AppError, EXIT_NUMERICAL};
use crate::math::{chi2_sf, invert_normal_matrix, ks_test_normal, solve_least_squares};
use crate::params::{Parameter, ParameterSet};

/// Relative chi-square reduction below which LM stops.
const FTOL: f64 = 1.5e-8;
/// Relative step size below which LM stops.
const XTOL: f64 = 1.5e-8;
/// Forward-difference step (relative).
const EPSFCN: f64 = 1.490_116_119_384_765_6e-8;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
/// Nelder–Mead absolute tolerances on vertices and function values.
const XATOL: f64 = 1e-4;
const FATOL: f64 = 1e-4;

/// Residual function handed to the minimizer.
pub trait Objective {
    fn residuals(&mut self, params: &ParameterSet) -> Result<Vec<f64>, AppError>;
}

/// Shared cancellation flag, polled once per minimizer iteration.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinimizeOptions {
    /// Function-evaluation budget; defaults to `2000 · (nvarys + 1)`.
    pub max_nfev: Option<usize>,
}

/// Why the minimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Converged,
    MaxNfev,
    Interrupted,
    /// Zero-iteration evaluation.
    Evaluated,
}

impl Stop {
    fn message(self) -> &'static str {
        match self {
            Stop::Converged => "Fit converged.",
            Stop::MaxNfev => "Fit aborted: maximum number of function evaluations reached.",
            Stop::Interrupted => "Fit interrupted by user.",
            Stop::Evaluated => "Parameters evaluated without minimization.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MinimizerResult {
    pub params: ParameterSet,
    pub residual: Vec<f64>,
    pub chisqr: f64,
    pub redchi: f64,
    pub aic: f64,
    pub bic: f64,
    pub nfev: usize,
    pub ndata: usize,
    pub nvarys: usize,
    pub nfree: usize,
    pub method: FitMethod,
    /// Varying parameters, in covariance order.
    pub var_names: Vec<String>,
    /// Covariance of the varying parameters (`leastsq` only).
    pub covariance: Option<DMatrix<f64>>,
    pub stop: Stop,
    pub success: bool,
    pub message: String,
}

impl MinimizerResult {
    fn new(
        params: ParameterSet,
        residual: Vec<f64>,
        var_names: Vec<String>,
        nfev: usize,
        method: FitMethod,
        stop: Stop,
    ) -> Self {
        let ndata = residual.len();
        let nvarys = var_names.len();
        let nfree = ndata.saturating_sub(nvarys);
        let chisqr: f64 = residual.iter().map(|r| r * r).sum();
        let redchi = chisqr / nfree.max(1) as f64;
        let n = ndata.max(1) as f64;
        let neg2_log_likel = n * (chisqr.max(1e-250) / n).ln();
        let k = nvarys as f64;
        Self {
            params,
            residual,
            chisqr,
            redchi,
            aic: neg2_log_likel + 2.0 * k,
            bic: neg2_log_likel + n.ln() * k,
            nfev,
            ndata,
            nvarys,
            nfree,
            method,
            var_names,
            covariance: None,
            stop,
            success: matches!(stop, Stop::Converged | Stop::Evaluated),
            message: stop.message().to_string(),
        }
    }

    pub fn interrupted(&self) -> bool {
        self.stop == Stop::Interrupted
    }

    /// `P(χ² > chisqr)` with `nfree` degrees of freedom.
    pub fn chi2_p_value(&self) -> f64 {
        chi2_sf(self.chisqr, self.nfree)
    }

    /// Kolmogorov–Smirnov p-value of the residuals against N(0, 1).
    pub fn ks_p_value(&self) -> f64 {
        ks_test_normal(&self.residual).1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bound {
    fn of(p: &Parameter) -> Bound {
        match (p.min, p.max) {
            (Some(lo), Some(hi)) if lo < hi => Bound::Both(lo, hi),
            (Some(lo), _) => Bound::Lower(lo),
            (None, Some(hi)) => Bound::Upper(hi),
            (None, None) => Bound::Free,
        }
    }

    fn to_internal(self, x: f64) -> f64 {
        match self {
            Bound::Free => x,
            Bound::Both(lo, hi) => (2.0 * (x - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0).asin(),
            Bound::Lower(lo) => ((x - lo + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Bound::Upper(hi) => ((hi - x + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        }
    }

    fn to_external(self, u: f64) -> f64 {
        match self {
            Bound::Free => u,
            Bound::Both(lo, hi) => lo + (u.sin() + 1.0) * (hi - lo) / 2.0,
            Bound::Lower(lo) => lo - 1.0 + (u * u + 1.0).sqrt(),
            Bound::Upper(hi) => hi + 1.0 - (u * u + 1.0).sqrt(),
        }
    }

    /// `dx/du`.
    fn gradient(self, u: f64) -> f64 {
        match self {
            Bound::Free => 1.0,
            Bound::Both(lo, hi) => u.cos() * (hi - lo) / 2.0,
            Bound::Lower(_) => u / (u * u + 1.0).sqrt(),
            Bound::Upper(_) => -u / (u * u + 1.0).sqrt(),
        }
    }
}

/// The objective seen through internal coordinates.
struct Problem<'a, O: Objective> {
    objective: &'a mut O,
    base: ParameterSet,
    names: Vec<String>,
    bounds: Vec<Bound>,
    nfev: usize,
}

impl<'a, O: Objective> Problem<'a, O> {
    fn new(objective: &'a mut O, params: &ParameterSet) -> Result<Self, AppError> {
        let mut base = params.clone();
        base.update_constraints()?;
        let names = base.free_names();
        let bounds = names
            .iter()
            .filter_map(|n| base.get(n))
            .map(Bound::of)
            .collect();
        Ok(Self {
            objective,
            base,
            names,
            bounds,
            nfev: 0,
        })
    }

    fn start(&self) -> Vec<f64> {
        self.names
            .iter()
            .zip(&self.bounds)
            .map(|(n, b)| b.to_internal(self.base.value(n).unwrap_or(0.0)))
            .collect()
    }

    fn params_at(&self, u: &[f64]) -> Result<ParameterSet, AppError> {
        let mut params = self.base.clone();
        for ((name, bound), &ui) in self.names.iter().zip(&self.bounds).zip(u) {
            if let Some(p) = params.get_mut(name) {
                p.value = bound.to_external(ui);
            }
        }
        params.update_constraints()?;
        Ok(params)
    }

    fn residuals(&mut self, u: &[f64]) -> Result<Vec<f64>, AppError> {
        let params = self.params_at(u)?;
        self.nfev += 1;
        let r = self.objective.residuals(&params)?;
        if r.iter().any(|v| !v.is_finite()) {
            return Err(AppError::numerical("Objective returned non-finite residuals."));
        }
        Ok(r)
    }

    /// Residuals at a trial point; numerical failures reject the point.
    fn trial(&mut self, u: &[f64]) -> Result<Option<Vec<f64>>, AppError> {
        match self.residuals(u) {
            Ok(r) => Ok(Some(r)),
            Err(e) if e.exit_code() == EXIT_NUMERICAL => {
                log::debug!("Rejected trial point: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn chisqr(&mut self, u: &[f64]) -> Result<f64, AppError> {
        Ok(self.trial(u)?.map_or(f64::INFINITY, |r| sum_sq(&r)))
    }

    /// Forward-difference Jacobian in internal coordinates.
    fn jacobian(&mut self, u: &[f64], r: &[f64]) -> Result<DMatrix<f64>, AppError> {
        let m = r.len();
        let mut jac = DMatrix::<f64>::zeros(m, u.len());
        let mut probe = u.to_vec();
        for j in 0..u.len() {
            let h = EPSFCN * u[j].abs().max(1.0);
            probe[j] = u[j] + h;
            let r_h = self.residuals(&probe)?;
            probe[j] = u[j];
            if r_h.len() != m {
                return Err(AppError::numerical("Residual vector changed length during minimization."));
            }
            for i in 0..m {
                jac[(i, j)] = (r_h[i] - r[i]) / h;
            }
        }
        Ok(jac)
    }

    fn finish(
        &mut self,
        u: &[f64],
        residual: Option<Vec<f64>>,
        method: FitMethod,
        stop: Stop,
    ) -> Result<MinimizerResult, AppError> {
        let residual = match residual {
            Some(r) => r,
            None => self.residuals(u)?,
        };
        let mut params = self.params_at(u)?;
        for name in &self.names {
            if let Some(p) = params.get_mut(name) {
                p.stderr = None;
            }
        }
        Ok(MinimizerResult::new(
            params,
            residual,
            self.names.clone(),
            self.nfev,
            method,
            stop,
        ))
    }
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn norm(v: &[f64]) -> f64 {
    sum_sq(v).sqrt()
}

/// Minimize `objective` over the free parameters of `params`.
///
/// On interruption the best point reached so far is returned with
/// `stop == Stop::Interrupted`.
pub fn minimize<O: Objective>(
    objective: &mut O,
    params: &ParameterSet,
    method: FitMethod,
    options: &MinimizeOptions,
    interrupt: &Interrupt,
) -> Result<MinimizerResult, AppError> {
    let mut problem = Problem::new(objective, params)?;
    let max_nfev = options.max_nfev.unwrap_or(2000 * (problem.names.len() + 1));

    let result = match method {
        FitMethod::LeastSq => levenberg_marquardt(&mut problem, max_nfev, interrupt)?,
        FitMethod::Nelder => nelder_mead(&mut problem, max_nfev, interrupt)?,
    };
    if result.stop == Stop::MaxNfev {
        log::warn!("{}", result.message);
    }
    Ok(result)
}

/// Zero-iteration evaluation at `params` (one function evaluation).
pub fn evaluate<O: Objective>(
    objective: &mut O,
    params: &ParameterSet,
    method: FitMethod,
) -> Result<MinimizerResult, AppError> {
    let mut problem = Problem::new(objective, params)?;
    let u = problem.start();
    let residual = problem.residuals(&u)?;
    Ok(MinimizerResult::new(
        problem.params_at(&u)?,
        residual,
        problem.names.clone(),
        problem.nfev,
        method,
        Stop::Evaluated,
    ))
}

fn levenberg_marquardt<O: Objective>(
    problem: &mut Problem<'_, O>,
    max_nfev: usize,
    interrupt: &Interrupt,
) -> Result<MinimizerResult, AppError> {
    let mut u = problem.start();
    let n = u.len();
    let mut r = problem.residuals(&u)?;
    let mut chi = sum_sq(&r);
    let m = r.len();
    let mut lambda = LAMBDA_INIT;
    let mut iteration = 0usize;

    let stop = 'outer: loop {
        if interrupt.is_triggered() {
            break Stop::Interrupted;
        }
        if n == 0 || chi == 0.0 {
            break Stop::Converged;
        }
        if problem.nfev >= max_nfev {
            break Stop::MaxNfev;
        }

        let jac = problem.jacobian(&u, &r)?;
        let jtj = jac.transpose() * &jac;
        let scale: Vec<f64> = (0..n).map(|j| jtj[(j, j)].max(1e-12)).collect();
        let rhs = DVector::from_iterator(m + n, r.iter().map(|v| -v).chain(std::iter::repeat_n(0.0, n)));

        loop {
            let mut a = DMatrix::<f64>::zeros(m + n, n);
            a.view_mut((0, 0), (m, n)).copy_from(&jac);
            for j in 0..n {
                a[(m + j, j)] = (lambda * scale[j]).sqrt();
            }

            if let Some(step) = solve_least_squares(&a, &rhs) {
                let trial_u: Vec<f64> = u.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
                if let Some(trial_r) = problem.trial(&trial_u)? {
                    let trial_chi = sum_sq(&trial_r);
                    if trial_chi < chi {
                        let reduction = (chi - trial_chi) / chi;
                        let step_norm = step.norm();
                        let small_step = step_norm <= XTOL * (norm(&u) + XTOL);
                        u = trial_u;
                        r = trial_r;
                        chi = trial_chi;
                        lambda = (lambda / 10.0).max(1e-15);
                        iteration += 1;
                        log::debug!("LM iteration {iteration}: chisqr={chi:.6e} lambda={lambda:.1e}");
                        if reduction < FTOL || small_step {
                            break 'outer Stop::Converged;
                        }
                        break;
                    }
                }
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No downhill step left at any damping.
                break 'outer Stop::Converged;
            }
            if problem.nfev >= max_nfev {
                break 'outer Stop::MaxNfev;
            }
            if interrupt.is_triggered() {
                break 'outer Stop::Interrupted;
            }
        }
    };

    let covariance = if n > 0 && stop != Stop::Interrupted {
        covariance_at(problem, &u, &r)?
    } else {
        None
    };

    let mut result = problem.finish(&u, Some(r), FitMethod::LeastSq, stop)?;
    if let Some(cov_int) = covariance {
        let grads: Vec<f64> = problem.bounds.iter().zip(&u).map(|(b, &ui)| b.gradient(ui)).collect();
        let factor = if result.nfree > 0 { result.redchi } else { 1.0 };
        let cov = DMatrix::from_fn(n, n, |i, j| cov_int[(i, j)] * grads[i] * grads[j] * factor);
        for (i, name) in problem.names.iter().enumerate() {
            if let Some(p) = result.params.get_mut(name) {
                let var = cov[(i, i)];
                p.stderr = (var.is_finite() && var >= 0.0).then(|| var.sqrt());
            }
        }
        result.covariance = Some(cov);
    } else if n > 0 && stop != Stop::Interrupted {
        log::warn!("Covariance matrix is singular; parameter uncertainties are not available.");
    }
    Ok(result)
}

fn covariance_at<O: Objective>(
    problem: &mut Problem<'_, O>,
    u: &[f64],
    r: &[f64],
) -> Result<Option<DMatrix<f64>>, AppError> {
    let jac = problem.jacobian(u, r)?;
    let jtj = jac.transpose() * &jac;
    Ok(invert_normal_matrix(&jtj))
}

fn nelder_mead<O: Objective>(
    problem: &mut Problem<'_, O>,
    max_nfev: usize,
    interrupt: &Interrupt,
) -> Result<MinimizerResult, AppError> {
    let start = problem.start();
    let n = start.len();
    if n == 0 {
        return problem.finish(&start, None, FitMethod::Nelder, Stop::Converged);
    }

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    let f0 = problem.chisqr(&start)?;
    simplex.push((start.clone(), f0));
    for i in 0..n {
        let mut v = start.clone();
        v[i] = if v[i] != 0.0 { 1.05 * v[i] } else { 0.000_25 };
        let f = problem.chisqr(&v)?;
        simplex.push((v, f));
    }

    let stop = loop {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        if interrupt.is_triggered() {
            break Stop::Interrupted;
        }
        let (best, f_best) = (&simplex[0].0, simplex[0].1);
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|(v, _)| v.iter().zip(best).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        let f_spread = simplex[1..].iter().map(|(_, f)| (f - f_best).abs()).fold(0.0_f64, f64::max);
        if x_spread <= XATOL && f_spread <= FATOL {
            break Stop::Converged;
        }
        if problem.nfev >= max_nfev {
            break Stop::MaxNfev;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|(v, _)| v[j]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + t * (c - w))
                .collect()
        };

        let xr = along(1.0);
        let fr = problem.chisqr(&xr)?;
        if fr < simplex[0].1 {
            let xe = along(2.0);
            let fe = problem.chisqr(&xe)?;
            simplex[n] = if fe < fr { (xe, fe) } else { (xr, fr) };
            continue;
        }
        if fr < simplex[n - 1].1 {
            simplex[n] = (xr, fr);
            continue;
        }

        // Outside contraction when the reflection helped at all, inside otherwise.
        let xc = if fr < worst.1 { along(0.5) } else { along(-0.5) };
        let fc = problem.chisqr(&xc)?;
        if fc < fr.min(worst.1) {
            simplex[n] = (xc, fc);
            continue;
        }

        // Shrink toward the best vertex.
        let best = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let v: Vec<f64> = best.iter().zip(&vertex.0).map(|(b, x)| b + 0.5 * (x - b)).collect();
            let f = problem.chisqr(&v)?;
            *vertex = (v, f);
        }
    };

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let best = simplex[0].0.clone();
    problem.finish(&best, None, FitMethod::Nelder, stop)
}
