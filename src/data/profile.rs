//! One resonance's CPMG intensity series under one set of conditions.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::cache::EvaluationCache;
use crate::data::resonance::Resonance;
use crate::domain::{ArgSlot, CpmgVariant, ExperimentSettings, xi_ratio};
use crate::error::AppError;
use crate::models::{Geometry, ObservableArgs, ObservableCalculator};
use crate::params::{Parameter, ParameterName, ParameterSet};
use crate::report::sci_width;

/// Raw measurements of one peak as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub peak: String,
    pub ncycs: Vec<i64>,
    pub intensities: Vec<f64>,
    pub errors: Vec<f64>,
}

/// Experiment-level context shared by every profile of one experiment file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentContext {
    pub name: String,
    pub variant: CpmgVariant,
    pub settings: ExperimentSettings,
}

/// A table row bound to this profile's long parameter name.
#[derive(Debug, Clone)]
struct ProfileArgument {
    slot: ArgSlot,
    full_name: String,
    default: Parameter,
}

#[derive(Debug)]
pub struct Profile {
    pub experiment: String,
    pub resonance: Resonance,
    variant: CpmgVariant,
    ncycs: Vec<u32>,
    val: Vec<f64>,
    err: Vec<f64>,
    tau_cp: Vec<f64>,
    h_larmor_frq: f64,
    temperature: f64,
    time_t2: f64,
    /// Parameters the observable reads, in table order.
    arguments: Vec<ProfileArgument>,
    calculator: ObservableCalculator,
    identity: String,
    cache: EvaluationCache,
}

impl Clone for Profile {
    /// Deep copy with a fresh, empty evaluation cache.
    fn clone(&self) -> Self {
        Self {
            experiment: self.experiment.clone(),
            resonance: self.resonance.clone(),
            variant: self.variant,
            ncycs: self.ncycs.clone(),
            val: self.val.clone(),
            err: self.err.clone(),
            tau_cp: self.tau_cp.clone(),
            h_larmor_frq: self.h_larmor_frq,
            temperature: self.temperature,
            time_t2: self.time_t2,
            arguments: self.arguments.clone(),
            calculator: self.calculator.clone(),
            identity: self.identity.clone(),
            cache: EvaluationCache::new(&self.identity),
        }
    }
}

impl Profile {
    /// Validate a measurement record and resolve everything evaluation needs.
    pub fn new(context: &ExperimentContext, record: MeasurementRecord) -> Result<Self, AppError> {
        let exp = context.name.as_str();
        let peak = record.peak.as_str();
        let n = record.ncycs.len();
        if n == 0 {
            return Err(AppError::data(format!("Profile '{peak}' in experiment '{exp}' has no data points.")));
        }
        if record.intensities.len() != n || record.errors.len() != n {
            return Err(AppError::data(format!(
                "Profile '{peak}' in experiment '{exp}' has {n} cycle counts, {} intensities and {} uncertainties.",
                record.intensities.len(),
                record.errors.len()
            )));
        }
        if let Some(bad) = record.errors.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
            return Err(AppError::data(format!(
                "Profile '{peak}' in experiment '{exp}' has a non-positive uncertainty ({bad})."
            )));
        }
        if let Some(bad) = record.intensities.iter().find(|v| !v.is_finite()) {
            return Err(AppError::data(format!(
                "Profile '{peak}' in experiment '{exp}' has a non-finite intensity ({bad})."
            )));
        }
        let ncycs = record
            .ncycs
            .iter()
            .map(|&c| {
                u32::try_from(c).map_err(|_| {
                    AppError::data(format!("Profile '{peak}' in experiment '{exp}' has an invalid cycle count ({c})."))
                })
            })
            .collect::<Result<Vec<u32>, AppError>>()?;

        let settings = &context.settings;
        let variant = context.variant;
        for key in variant.required_settings() {
            settings.require(key, exp)?;
        }
        let h_larmor_frq = settings.require("h_larmor_frq", exp)?;
        let temperature = settings.require("temperature", exp)?;
        let time_t2 = settings.require("time_t2", exp)?;
        let pw = settings.require("pw", exp)?;
        let carrier = settings.require("carrier", exp)?;
        let time_equil = settings.time_equil.unwrap_or(0.0);
        let ncyc_max = settings
            .ncyc_max
            .unwrap_or_else(|| ncycs.iter().copied().max().unwrap_or(0));

        let resonance = Resonance::parse(peak)?;
        let element = resonance.observed().element();
        let xi = xi_ratio(element).ok_or_else(|| {
            AppError::config(format!("Unsupported nucleus '{element}' in peak '{peak}' of experiment '{exp}'."))
        })?;

        let geometry = Geometry {
            variant,
            pw,
            time_t2,
            time_equil,
            carrier,
            ppm_to_rads: 2.0 * PI * h_larmor_frq * xi,
            ncyc_max,
        };
        let tau_cp = ncycs.iter().map(|&c| geometry.tau_cp(c)).collect();

        let nucleus = resonance.nucleus_label();
        let arguments = variant
            .param_table()
            .iter()
            .map(|spec| {
                let name = ParameterName::scoped(spec.short, spec.scope, &nucleus, h_larmor_frq, temperature);
                let mut default = Parameter::from_spec(spec, name);
                if spec.slot == ArgSlot::Cs {
                    default.value = carrier;
                }
                ProfileArgument {
                    slot: spec.slot,
                    full_name: default.full_name(),
                    default,
                }
            })
            .collect();

        let identity = format!("{exp}/{nucleus}/{h_larmor_frq}/{temperature}");

        Ok(Self {
            experiment: context.name.clone(),
            resonance,
            variant,
            ncycs,
            val: record.intensities,
            err: record.errors,
            tau_cp,
            h_larmor_frq,
            temperature,
            time_t2,
            arguments,
            calculator: ObservableCalculator::new(geometry),
            cache: EvaluationCache::new(&identity),
            identity,
        })
    }

    pub fn name(&self) -> String {
        self.resonance.to_string()
    }

    pub fn variant(&self) -> CpmgVariant {
        self.variant
    }

    pub fn len(&self) -> usize {
        self.ncycs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ncycs.is_empty()
    }

    pub fn ncycs(&self) -> &[u32] {
        &self.ncycs
    }

    pub fn intensities(&self) -> &[f64] {
        &self.val
    }

    pub fn errors(&self) -> &[f64] {
        &self.err
    }

    /// Free-precession delay per point (0 for reference points).
    pub fn tau_cp(&self) -> &[f64] {
        &self.tau_cp
    }

    pub fn h_larmor_frq(&self) -> f64 {
        self.h_larmor_frq
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Full names of every parameter the profile reads, in table order.
    pub fn param_names(&self) -> Vec<String> {
        self.arguments.iter().map(|a| a.full_name.clone()).collect()
    }

    /// Default parameters for this profile (chemical shift on the carrier).
    pub fn default_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.arguments.iter().map(|a| &a.default)
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    pub fn reset_cache(&mut self) {
        self.cache.reset();
    }

    fn observable_args(&self, params: &ParameterSet) -> Result<ObservableArgs, AppError> {
        let mut args = ObservableArgs::default();
        for argument in &self.arguments {
            let value = params.value(&argument.full_name).ok_or_else(|| {
                AppError::config(format!(
                    "Parameter '{}' required by profile '{}' of experiment '{}' is not defined.",
                    argument.full_name,
                    self.name(),
                    self.experiment
                ))
            })?;
            args.set(argument.slot, value);
        }
        Ok(args)
    }

    /// Predicted curve before scaling (`i0 = 1`).
    pub fn unscaled(&mut self, params: &ParameterSet) -> Result<Vec<f64>, AppError> {
        let args = self.observable_args(params)?;
        let mut out = Vec::with_capacity(self.ncycs.len());
        for &ncyc in &self.ncycs {
            out.push(self.cache.observable(&self.calculator, &args, ncyc)?);
        }
        Ok(out)
    }

    /// Weighted least-squares scale between `unscaled` and the measurements.
    ///
    /// A curve that is identically zero yields a scale of zero.
    pub fn scale_for(&self, unscaled: &[f64]) -> f64 {
        let (num, den) = unscaled
            .iter()
            .zip(&self.val)
            .zip(&self.err)
            .fold((0.0, 0.0), |(num, den), ((c, v), e)| {
                (num + c * v / (e * e), den + (c / e) * (c / e))
            });
        if den > 0.0 { num / den } else { 0.0 }
    }

    pub fn scale(&mut self, params: &ParameterSet) -> Result<f64, AppError> {
        let unscaled = self.unscaled(params)?;
        Ok(self.scale_for(&unscaled))
    }

    /// Scaled predicted intensities, one per point.
    pub fn predict(&mut self, params: &ParameterSet) -> Result<Vec<f64>, AppError> {
        let unscaled = self.unscaled(params)?;
        let scale = self.scale_for(&unscaled);
        Ok(unscaled.into_iter().map(|c| c * scale).collect())
    }

    /// `(predicted - measured) / uncertainty` per point.
    pub fn residuals(&mut self, params: &ParameterSet) -> Result<Vec<f64>, AppError> {
        let predicted = self.predict(params)?;
        let out: Vec<f64> = predicted
            .iter()
            .zip(&self.val)
            .zip(&self.err)
            .map(|((p, v), e)| (p - v) / e)
            .collect();
        if out.iter().any(|r| !r.is_finite()) {
            return Err(AppError::numerical(format!(
                "Non-finite residual in profile '{}' of experiment '{}'.",
                self.name(),
                self.experiment
            )));
        }
        Ok(out)
    }

    /// CPMG frequency `ncyc / time_t2` per point (Hz).
    pub fn nu_cpmg(&self) -> Vec<f64> {
        self.ncycs.iter().map(|&c| f64::from(c) / self.time_t2).collect()
    }

    fn with_points(&self, indexes: &[usize]) -> Profile {
        let mut out = self.clone();
        out.ncycs = indexes.iter().map(|&i| self.ncycs[i]).collect();
        out.val = indexes.iter().map(|&i| self.val[i]).collect();
        out.err = indexes.iter().map(|&i| self.err[i]).collect();
        out.tau_cp = indexes.iter().map(|&i| self.tau_cp[i]).collect();
        out
    }

    /// Bootstrap copy.
    ///
    /// Reference and non-reference points are resampled with replacement
    /// separately, keeping each pool's size; points come back in order of
    /// cycle count.
    pub fn resample<R: Rng>(&self, rng: &mut R) -> Profile {
        let (reference, relaxed): (Vec<usize>, Vec<usize>) = (0..self.ncycs.len()).partition(|&i| self.ncycs[i] == 0);

        let mut indexes = Vec::with_capacity(self.ncycs.len());
        for pool in [&reference, &relaxed] {
            for _ in 0..pool.len() {
                indexes.push(pool[rng.gen_range(0..pool.len())]);
            }
        }
        indexes.sort_by_key(|&i| (self.ncycs[i], i));
        self.with_points(&indexes)
    }

    /// Monte-Carlo copy: the predicted curve at `params` plus Gaussian noise
    /// of each point's uncertainty.
    pub fn synthesize<R: Rng>(&mut self, params: &ParameterSet, rng: &mut R) -> Result<Profile, AppError> {
        let predicted = self.predict(params)?;
        let mut out = self.clone();
        for (i, p) in predicted.iter().enumerate() {
            let noise = Normal::new(0.0, self.err[i])
                .map_err(|e| AppError::numerical(format!("Noise distribution error: {e}")))?;
            out.val[i] = p + noise.sample(rng);
        }
        Ok(out)
    }

    /// Text block with measured and (optionally) calculated intensities.
    pub fn format_report(&mut self, params: Option<&ParameterSet>) -> Result<String, AppError> {
        let calculated = match params {
            Some(p) => Some(self.predict(p)?),
            None => None,
        };

        let nu_cpmg = self.nu_cpmg();

        let mut out = String::new();
        out.push_str(&format!("[{}]\n", self.name()));
        out.push_str(&format!(
            "# {:>5} {:>12}   {:>17} {:>17} {:>17}\n",
            "ncyc", "nu_cpmg (hz)", "intensity (exp)", "uncertainty", "intensity (calc)"
        ));
        for i in 0..self.ncycs.len() {
            out.push_str(&format!(
                "  {:5} {:12.3} = {} {} ",
                self.ncycs[i],
                nu_cpmg[i],
                sci_width(self.val[i], 17, 8),
                sci_width(self.err[i], 17, 8)
            ));
            match &calculated {
                Some(c) => out.push_str(&sci_width(c[i], 17, 8)),
                None => out.push_str(&format!("{:<17}", "xxx")),
            }
            out.push('\n');
        }
        out.push_str("\n\n");
        Ok(out.to_uppercase())
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} ({} points, B0 {:.1} MHz, T {:.1} C)",
            self.name(),
            self.ncycs.len(),
            self.h_larmor_frq,
            self.temperature
        )
    }
}
