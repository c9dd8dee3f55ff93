//! Bootstrap and Monte-Carlo replicate fits.
//!
//! Each replicate builds its own copy of the dataset (fresh caches), refits
//! it from the fitted parameters and records the values of the varying
//! parameters. Replicates run in parallel; replicate `i` draws from
//! `StdRng::seed_from_u64(seed + i)`, so results do not depend on scheduling.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::data::Dataset;
use crate::error::AppError;
use crate::fit::driver::{FitDriver, FitSection};
use crate::params::ParameterSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicateKind {
    /// Resample points with replacement.
    Bootstrap,
    /// Best-fit curves plus Gaussian noise.
    MonteCarlo,
}

impl ReplicateKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ReplicateKind::Bootstrap => "Bootstrap",
            ReplicateKind::MonteCarlo => "MonteCarlo",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicateSet {
    pub kind: ReplicateKind,
    /// Varying parameters, in column order.
    pub names: Vec<String>,
    /// One row of values per replicate.
    pub rows: Vec<Vec<f64>>,
}

impl ReplicateSet {
    /// Mean and sample standard deviation per parameter.
    pub fn summary(&self) -> Vec<(String, f64, f64)> {
        let n = self.rows.len() as f64;
        self.names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let mean = self.rows.iter().map(|r| r[j]).sum::<f64>() / n;
                let var = if self.rows.len() > 1 {
                    self.rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / (n - 1.0)
                } else {
                    0.0
                };
                (name.clone(), mean, var.sqrt())
            })
            .collect()
    }
}

/// Build one replicate dataset.
pub fn make_replicate(
    kind: ReplicateKind,
    data: &Dataset,
    params: &ParameterSet,
    rng: &mut StdRng,
) -> Result<Dataset, AppError> {
    match kind {
        ReplicateKind::Bootstrap => Ok(data.resample(rng)),
        ReplicateKind::MonteCarlo => data.clone().synthesize(params, rng),
    }
}

/// Fit `count` replicates of `data` starting from the fitted `params`.
pub fn run_replicates(
    kind: ReplicateKind,
    count: usize,
    seed: u64,
    data: &Dataset,
    params: &ParameterSet,
    sections: &[FitSection],
    driver: &FitDriver,
) -> Result<ReplicateSet, AppError> {
    let names = params.free_names();
    let driver = driver.clone().quiet();
    log::info!("Running {count} {} replicate fit(s)", kind.dir_name());

    let rows = (0..count)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut replicate = make_replicate(kind, data, params, &mut rng)?;
            let mut fitted = params.clone();
            let outcome = driver.run(&mut replicate, &mut fitted, sections)?;
            if outcome.interrupted {
                return Err(AppError::interrupted("Replicate fits interrupted."));
            }
            log::debug!("Replicate {} done (chisqr {:.3e})", i + 1, outcome.result.chisqr);
            Ok(names.iter().map(|n| fitted.value(n).unwrap_or(f64::NAN)).collect())
        })
        .collect::<Result<Vec<Vec<f64>>, AppError>>()?;

    Ok(ReplicateSet { kind, names, rows })
}
