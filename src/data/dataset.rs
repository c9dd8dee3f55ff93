//! Ordered collections of profiles.

use indexmap::IndexMap;
use rand::Rng;
use rayon::prelude::*;

use crate::data::profile::Profile;
use crate::error::AppError;
use crate::fit::Objective;
use crate::params::ParameterSet;

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    profiles: Vec<Profile>,
}

impl Dataset {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }

    pub fn push(&mut self, profile: Profile) {
        self.profiles.push(profile);
    }

    pub fn extend(&mut self, other: Dataset) {
        self.profiles.extend(other.profiles);
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Number of data points over every profile.
    pub fn ndata(&self) -> usize {
        self.profiles.iter().map(Profile::len).sum()
    }

    /// Full names referenced by any profile, first occurrence first.
    pub fn param_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for profile in &self.profiles {
            for name in profile.param_names() {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        out
    }

    /// Add table defaults for every parameter not yet in `params`.
    pub fn register_parameters(&self, params: &mut ParameterSet) {
        for profile in &self.profiles {
            for p in profile.default_parameters() {
                if !params.contains(&p.full_name()) {
                    params.insert(p.clone());
                }
            }
        }
    }

    /// Concatenated residuals, in profile order.
    ///
    /// Profiles are evaluated in parallel; each one (and its cache) is only
    /// touched by one worker.
    pub fn residuals(&mut self, params: &ParameterSet) -> Result<Vec<f64>, AppError> {
        let parts: Vec<Vec<f64>> = self
            .profiles
            .par_iter_mut()
            .map(|p| p.residuals(params))
            .collect::<Result<_, _>>()?;
        Ok(parts.concat())
    }

    /// Keep profiles matching `include` (all when empty), then drop those
    /// matching `exclude`.
    pub fn filter_residues(self, include: &[String], exclude: &[String]) -> Result<Dataset, AppError> {
        let before = self.profiles.len();
        let profiles: Vec<Profile> = self
            .profiles
            .into_iter()
            .filter(|p| include.is_empty() || include.iter().any(|s| p.resonance.matches_residue(s)))
            .filter(|p| !exclude.iter().any(|s| p.resonance.matches_residue(s)))
            .collect();
        if profiles.is_empty() {
            return Err(AppError::data("No data left to fit after residue selection."));
        }
        if profiles.len() != before {
            log::info!("Residue selection kept {} of {before} profiles", profiles.len());
        }
        Ok(Dataset { profiles })
    }

    /// Bootstrap replicate: every profile resampled, fresh caches.
    pub fn resample<R: Rng>(&self, rng: &mut R) -> Dataset {
        Dataset {
            profiles: self.profiles.iter().map(|p| p.resample(rng)).collect(),
        }
    }

    /// Monte-Carlo replicate: predicted curves at `params` plus noise.
    pub fn synthesize<R: Rng>(&mut self, params: &ParameterSet, rng: &mut R) -> Result<Dataset, AppError> {
        let profiles = self
            .profiles
            .iter_mut()
            .map(|p| p.synthesize(params, rng))
            .collect::<Result<_, _>>()?;
        Ok(Dataset { profiles })
    }

    /// Report blocks grouped by experiment name, in first-seen order.
    pub fn format_reports(&mut self, params: Option<&ParameterSet>) -> Result<IndexMap<String, String>, AppError> {
        let mut out: IndexMap<String, String> = IndexMap::new();
        for profile in &mut self.profiles {
            let block = profile.format_report(params)?;
            out.entry(profile.experiment.clone()).or_default().push_str(&block);
        }
        Ok(out)
    }
}

impl FromIterator<Profile> for Dataset {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        Dataset {
            profiles: iter.into_iter().collect(),
        }
    }
}

impl Objective for Dataset {
    fn residuals(&mut self, params: &ParameterSet) -> Result<Vec<f64>, AppError> {
        Dataset::residuals(self, params)
    }
}
