//! Fit driver.
//!
//! For each fit section, in order:
//!
//! 1. apply the section's status directives to the global parameters
//! 2. partition the dataset into independent clusters
//! 3. minimize each cluster and merge its fitted values back
//! 4. with more than one cluster, evaluate the whole dataset once so the
//!    reported chi-square and degrees of freedom are global
//! 5. report chi-square and reduced chi-square
//!
//! An interruption salvages the current cluster with one zero-iteration
//! evaluation at its best point and ends the whole run.

use crate::data::Dataset;
use crate::domain::FitMethod;
use crate::error::AppError;
use crate::fit::clusters::find_independent_clusters;
use crate::fit::minimizer::{Interrupt, MinimizeOptions, MinimizerResult, evaluate, minimize};
use crate::params::{Directive, ParameterSet, apply_directives};
use crate::report::{format_chi2, header1, header2};

pub const DEFAULT_SECTION: &str = "Standard Calculation";

/// One section of a method file.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSection {
    pub name: String,
    /// Overrides the command-line method for this section.
    pub fitmethod: Option<FitMethod>,
    pub directives: Vec<Directive>,
}

impl FitSection {
    pub fn standard() -> Self {
        Self {
            name: DEFAULT_SECTION.to_string(),
            fitmethod: None,
            directives: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub result: MinimizerResult,
    pub interrupted: bool,
}

/// Runs fit sections over one dataset.
#[derive(Debug, Clone)]
pub struct FitDriver {
    pub method: FitMethod,
    pub options: MinimizeOptions,
    pub interrupt: Interrupt,
    /// Print section headers and chi-square lines to stdout.
    pub verbose: bool,
}

impl FitDriver {
    pub fn new(method: FitMethod, interrupt: Interrupt) -> Self {
        Self {
            method,
            options: MinimizeOptions::default(),
            interrupt,
            verbose: true,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    fn say(&self, text: &str) {
        if self.verbose {
            println!("{text}");
        }
    }

    /// Run `sections` (or the standard section when empty), updating `params`.
    pub fn run(
        &self,
        data: &mut Dataset,
        params: &mut ParameterSet,
        sections: &[FitSection],
    ) -> Result<FitOutcome, AppError> {
        let standard = [FitSection::standard()];
        let sections = if sections.is_empty() { &standard[..] } else { sections };

        self.say(&header1("Fit"));
        let mut last: Option<MinimizerResult> = None;

        for section in sections {
            self.say(&header2(&section.name));
            apply_directives(params, &section.directives)
                .map_err(|e| AppError::new(e.exit_code(), format!("In section [{}]: {e}", section.name)))?;

            let clusters = find_independent_clusters(data, params)?;
            let method = section.fitmethod.unwrap_or(self.method);
            log::info!("Section '{}': {} cluster(s), method {}", section.name, clusters.len(), method.name());
            self.say(&format!("Fitting method: {}\n", method.description()));

            let n_clusters = clusters.len();
            let mut cluster_result: Option<MinimizerResult> = None;
            for mut cluster in clusters {
                if n_clusters > 1 {
                    let label = cluster.label.to_string();
                    self.say(&format!("[{}]", if label.is_empty() { "-" } else { label.as_str() }));
                }

                let mut result = minimize(&mut cluster.data, &cluster.params, method, &self.options, &self.interrupt)?;
                let interrupted = result.interrupted();
                if interrupted {
                    eprintln!("\n -- Keyboard Interrupt: minimization stopped");
                    result = evaluate(&mut cluster.data, &result.params, method)?;
                }

                params.merge_fitted(&result.params)?;
                self.say(&format_chi2(result.chisqr, result.redchi));

                if interrupted {
                    result.params = params.clone();
                    return Ok(FitOutcome {
                        result,
                        interrupted: true,
                    });
                }
                cluster_result = Some(result);
            }

            let result = match cluster_result {
                Some(r) if n_clusters == 1 => {
                    let mut r = r;
                    r.params = params.clone();
                    r
                }
                _ => {
                    let mut global = evaluate(data, params, method)?;
                    global.params = params.clone();
                    global
                }
            };
            if n_clusters > 1 {
                self.say(&format_chi2(result.chisqr, result.redchi));
            }
            last = Some(result);
        }

        let result = last.ok_or_else(|| AppError::config("No fit section to run."))?;
        if self.verbose && !result.method.reports_uncertainties() {
            log::warn!(
                "Uncertainties and covariance of fitting parameters are only calculated when using the 'leastsq' fitting method."
            );
        }
        Ok(FitOutcome {
            result,
            interrupted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExperimentContext, MeasurementRecord, Profile};
    use crate::domain::{CpmgVariant, ExperimentSettings};
    use crate::params::Status;

    fn context() -> ExperimentContext {
        ExperimentContext {
            name: "cpmg_600".to_string(),
            variant: CpmgVariant::NIp,
            settings: ExperimentSettings {
                h_larmor_frq: Some(600.0),
                temperature: Some(25.0),
                time_t2: Some(0.04),
                pw: Some(35e-6),
                carrier: Some(118.0),
                ..Default::default()
            },
        }
    }

    /// Noise-free profiles generated at the table defaults with `dw` shifted.
    fn synthetic(peaks: &[&str]) -> (Dataset, ParameterSet) {
        let ncycs = vec![0, 1, 2, 4, 8, 16];
        let profiles: Vec<Profile> = peaks
            .iter()
            .map(|peak| {
                Profile::new(
                    &context(),
                    MeasurementRecord {
                        peak: peak.to_string(),
                        ncycs: ncycs.clone(),
                        intensities: vec![1.0; ncycs.len()],
                        errors: vec![0.01; ncycs.len()],
                    },
                )
                .unwrap()
            })
            .collect();
        let mut data = Dataset::new(profiles);
        let mut params = ParameterSet::new();
        data.register_parameters(&mut params);
        for peak in peaks {
            let nucleus = peak.split('-').next().unwrap().to_ascii_lowercase();
            params.set_value(&format!("dw__{nucleus}"), 1.5).unwrap();
        }
        params.set_value("kex__t25.0", 400.0).unwrap();

        let mut noisy = Dataset::new(Vec::new());
        for profile in data.profiles() {
            let mut p = profile.clone();
            let curve = p.predict(&params).unwrap();
            noisy.push(
                Profile::new(
                    &context(),
                    MeasurementRecord {
                        peak: p.name(),
                        ncycs: ncycs.clone(),
                        intensities: curve,
                        errors: vec![0.01; ncycs.len()],
                    },
                )
                .unwrap(),
            );
        }
        data = noisy;
        (data, params)
    }

    #[test]
    fn fixed_exchange_gives_one_cluster_per_residue_and_a_global_chi2() {
        let (mut data, mut params) = synthetic(&["G23N-H", "A24N-H"]);
        let sections = vec![FitSection {
            name: "residue specific".to_string(),
            fitmethod: None,
            directives: vec![
                Directive::new("pb", Status::Fix),
                Directive::new("kex", Status::Fix),
                Directive::new("dw", Status::Fix),
            ],
        }];
        let driver = FitDriver::new(FitMethod::LeastSq, Interrupt::new()).quiet();
        let outcome = driver.run(&mut data, &mut params, &sections).unwrap();
        assert!(!outcome.interrupted);
        let result = outcome.result;
        // Global evaluation over both residues.
        assert_eq!(result.ndata, 12);
        assert_eq!(result.nfev, 1);
        assert!(result.redchi < 1e-3, "{}", result.redchi);
        assert!(result.params.contains("r_nxy__a24n__b600.0__t25.0"));
    }

    #[test]
    fn interruption_ends_the_run_after_one_evaluation() {
        let (mut data, mut params) = synthetic(&["G23N-H"]);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let driver = FitDriver::new(FitMethod::LeastSq, interrupt).quiet();
        let sections = vec![FitSection::standard(), FitSection::standard()];
        let outcome = driver.run(&mut data, &mut params, &sections).unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.result.nfev, 1);
    }

    #[test]
    fn bad_directive_names_the_section() {
        let (mut data, mut params) = synthetic(&["G23N-H"]);
        let sections = vec![FitSection {
            name: "step 1".to_string(),
            fitmethod: None,
            directives: vec![Directive::new("i0", Status::Fix)],
        }];
        let driver = FitDriver::new(FitMethod::LeastSq, Interrupt::new()).quiet();
        let err = driver.run(&mut data, &mut params, &sections).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert!(err.message().contains("[step 1]"));
    }
}
