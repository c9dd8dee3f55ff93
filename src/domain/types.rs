//! Shared domain types.
//!
//! - experiment variants and their declarative parameter tables
//! - experimental settings as read from an experiment file
//! - fit method names

use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Ratio of a nucleus' gyromagnetic ratio to the proton's.
pub fn xi_ratio(atom: char) -> Option<f64> {
    match atom.to_ascii_uppercase() {
        'H' => Some(1.0),
        'N' => Some(0.101_329_118),
        'C' => Some(0.251_449_530),
        _ => None,
    }
}

/// CPMG experiment variants.
///
/// All variants share the same two-state exchange parameters; they differ in
/// the pulse-sequence topology used to build the observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum CpmgVariant {
    /// 15N in-phase CPMG.
    NIp,
    /// 15N CPMG with 1H CW decoupling and 16-step phase cycling.
    NCw,
    /// 15N CPMG with 1H CW decoupling and a single ±y refocusing element.
    NCwY,
}

impl CpmgVariant {
    pub const ALL: [CpmgVariant; 3] = [CpmgVariant::NIp, CpmgVariant::NCw, CpmgVariant::NCwY];

    pub fn name(self) -> &'static str {
        match self {
            CpmgVariant::NIp => "n_ip",
            CpmgVariant::NCw => "n_cw",
            CpmgVariant::NCwY => "n_cw_y",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            CpmgVariant::NIp => "15N in-phase CPMG",
            CpmgVariant::NCw => "15N CPMG with 1H CW decoupling (phase cycled)",
            CpmgVariant::NCwY => "15N CPMG with 1H CW decoupling (±y refocusing)",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CpmgVariant::NIp => {
                "Measures 15N in-phase relaxation during a CPMG train of length time_t2.\n\
                 The reference point (ncyc = 0) is recorded without the relaxation delay."
            }
            CpmgVariant::NCw => {
                "Measures 15N relaxation during a CPMG train with 1H CW decoupling.\n\
                 The observable is the average of two independent 16-step phase cycles;\n\
                 the sequence is padded with pw-long delays up to ncyc_max cycles."
            }
            CpmgVariant::NCwY => {
                "Measures 15N relaxation during two CPMG trains separated by a central\n\
                 180 pulse averaged over +y and -y phases to model miscalibration."
            }
        }
    }

    /// Short-name → long-name table for this variant.
    pub fn param_table(self) -> &'static [ParamSpec] {
        match self {
            CpmgVariant::NIp | CpmgVariant::NCw | CpmgVariant::NCwY => CPMG_N_PARAMS,
        }
    }

    /// Experimental settings that must be present in the experiment file.
    pub fn required_settings(self) -> &'static [&'static str] {
        match self {
            CpmgVariant::NIp | CpmgVariant::NCw | CpmgVariant::NCwY => {
                &["h_larmor_frq", "temperature", "time_t2", "pw", "carrier"]
            }
        }
    }

    /// Optional experimental settings and their default.
    pub fn optional_settings(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CpmgVariant::NIp | CpmgVariant::NCwY => &[("time_equil", "0.0")],
            CpmgVariant::NCw => &[("time_equil", "0.0"), ("ncyc_max", "largest ncyc of the profile")],
        }
    }
}

impl FromStr for CpmgVariant {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CpmgVariant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = CpmgVariant::ALL.iter().map(|v| v.name()).collect();
                AppError::config(format!(
                    "Unknown experiment variant '{s}'. Known variants: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Which experimental conditions qualify a parameter's long name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// Shared by every resonance measured at one temperature (`pb`, `kex`).
    Temperature,
    /// Specific to one nucleus, independent of conditions (`dw`).
    Nucleus,
    /// Specific to one nucleus at one temperature (`cs`).
    NucleusTemperature,
    /// Specific to one nucleus, field and temperature (relaxation rates).
    NucleusFieldTemperature,
}

/// Observable argument fed by a parameter table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgSlot {
    Pb,
    Kex,
    Dw,
    Cs,
    RNxy,
    DrNxy,
    RNz,
}

impl ArgSlot {
    pub const ALL: [ArgSlot; 7] = [
        ArgSlot::Pb,
        ArgSlot::Kex,
        ArgSlot::Dw,
        ArgSlot::Cs,
        ArgSlot::RNxy,
        ArgSlot::DrNxy,
        ArgSlot::RNz,
    ];
}

/// One row of a variant's declarative parameter table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub short: &'static str,
    pub slot: ArgSlot,
    pub scope: NameScope,
    pub default: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Varied by default (otherwise fixed).
    pub fitted: bool,
}

pub const CPMG_N_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        short: "pb",
        slot: ArgSlot::Pb,
        scope: NameScope::Temperature,
        default: 0.05,
        min: Some(0.0),
        max: Some(1.0),
        fitted: true,
    },
    ParamSpec {
        short: "kex",
        slot: ArgSlot::Kex,
        scope: NameScope::Temperature,
        default: 200.0,
        min: Some(0.0),
        max: None,
        fitted: true,
    },
    ParamSpec {
        short: "dw",
        slot: ArgSlot::Dw,
        scope: NameScope::Nucleus,
        default: 0.0,
        min: None,
        max: None,
        fitted: true,
    },
    ParamSpec {
        short: "cs",
        slot: ArgSlot::Cs,
        scope: NameScope::NucleusTemperature,
        default: 0.0,
        min: None,
        max: None,
        fitted: false,
    },
    ParamSpec {
        short: "r_nxy",
        slot: ArgSlot::RNxy,
        scope: NameScope::NucleusFieldTemperature,
        default: 5.0,
        min: Some(0.0),
        max: None,
        fitted: true,
    },
    ParamSpec {
        short: "dr_nxy",
        slot: ArgSlot::DrNxy,
        scope: NameScope::NucleusFieldTemperature,
        default: 0.0,
        min: None,
        max: None,
        fitted: false,
    },
    ParamSpec {
        short: "r_nz",
        slot: ArgSlot::RNz,
        scope: NameScope::NucleusFieldTemperature,
        default: 1.5,
        min: Some(0.0),
        max: None,
        fitted: false,
    },
];

/// Experimental settings of one experiment file, as written.
///
/// Every field is optional at parse time; each variant checks the ones it
/// needs when a profile is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSettings {
    /// 1H Larmor frequency (MHz).
    pub h_larmor_frq: Option<f64>,
    /// Sample temperature (°C).
    pub temperature: Option<f64>,
    /// Total CPMG relaxation delay (s).
    pub time_t2: Option<f64>,
    /// 90° pulse width (s).
    pub pw: Option<f64>,
    /// Carrier position (ppm).
    pub carrier: Option<f64>,
    /// Delay after the CPMG block (s).
    pub time_equil: Option<f64>,
    /// Largest cycle count of the padded sequence.
    pub ncyc_max: Option<u32>,
}

impl ExperimentSettings {
    /// Look up a required floating-point setting.
    pub fn require(&self, key: &str, experiment: &str) -> Result<f64, AppError> {
        let value = match key {
            "h_larmor_frq" => self.h_larmor_frq,
            "temperature" => self.temperature,
            "time_t2" => self.time_t2,
            "pw" => self.pw,
            "carrier" => self.carrier,
            "time_equil" => self.time_equil,
            "ncyc_max" => self.ncyc_max.map(f64::from),
            _ => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(v),
            Some(v) => Err(AppError::config(format!(
                "Experimental parameter '{key}' in experiment '{experiment}' is not finite ({v})."
            ))),
            None => Err(AppError::config(format!(
                "Missing required experimental parameter '{key}' in experiment '{experiment}'."
            ))),
        }
    }
}

/// Minimization methods accepted in method files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Levenberg–Marquardt least squares (reports uncertainties).
    #[value(name = "leastsq")]
    LeastSq,
    /// Nelder–Mead simplex on chi-square.
    Nelder,
}

impl FitMethod {
    pub const ALL: [FitMethod; 2] = [FitMethod::LeastSq, FitMethod::Nelder];

    pub fn name(self) -> &'static str {
        match self {
            FitMethod::LeastSq => "leastsq",
            FitMethod::Nelder => "nelder",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FitMethod::LeastSq => "least-squares using Levenberg-Marquardt",
            FitMethod::Nelder => "Nelder-Mead",
        }
    }

    /// Whether the method yields parameter uncertainties and covariance.
    pub fn reports_uncertainties(self) -> bool {
        matches!(self, FitMethod::LeastSq)
    }
}

impl FromStr for FitMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FitMethod::ALL
            .into_iter()
            .find(|m| m.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                let known: Vec<&str> = FitMethod::ALL.iter().map(|m| m.name()).collect();
                AppError::config(format!(
                    "The fitting method '{s}' is invalid. Please choose from: {}",
                    known.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_round_trip() {
        for v in CpmgVariant::ALL {
            assert_eq!(v.name().parse::<CpmgVariant>().unwrap(), v);
        }
        assert!("cest".parse::<CpmgVariant>().is_err());
    }

    #[test]
    fn param_table_short_names_are_unique() {
        for v in CpmgVariant::ALL {
            let table = v.param_table();
            for (i, a) in table.iter().enumerate() {
                assert!(table[i + 1..].iter().all(|b| b.short != a.short));
            }
        }
    }

    #[test]
    fn param_table_feeds_every_observable_argument_once() {
        for v in CpmgVariant::ALL {
            let table = v.param_table();
            assert_eq!(table.len(), ArgSlot::ALL.len());
            for slot in ArgSlot::ALL {
                assert_eq!(table.iter().filter(|spec| spec.slot == slot).count(), 1, "{v:?} {slot:?}");
            }
        }
    }

    #[test]
    fn missing_setting_is_a_config_error() {
        let settings = ExperimentSettings {
            h_larmor_frq: Some(600.0),
            ..Default::default()
        };
        assert_eq!(settings.require("h_larmor_frq", "e").unwrap(), 600.0);
        let err = settings.require("time_t2", "e").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert!(err.message().contains("time_t2"));
    }

    #[test]
    fn unknown_fit_method_lists_choices() {
        assert_eq!("leastsq".parse::<FitMethod>().unwrap(), FitMethod::LeastSq);
        let err = "powell".parse::<FitMethod>().unwrap_err();
        assert!(err.message().contains("leastsq"));
    }
}
