//! TOML input files.
//!
//! Experiment file:
//!
//! ```toml
//! [experiment]
//! name = "cpmg_600"
//! variant = "n_ip"
//!
//! [experimental_parameters]
//! h_larmor_frq = 600.0
//! temperature = 25.0
//! time_t2 = 0.04
//! pw = 35e-6
//! carrier = 118.0
//!
//! [data]
//! path = "data/600"
//! [data.profiles]
//! "G23N-H" = "G23N-H.csv"
//! ```
//!
//! Parameters file (`[global]` entries use short or full names, other tables
//! are keyed by short name and list assignments):
//!
//! ```toml
//! [global]
//! pb = 0.05
//! kex = { value = 500.0, min = 0.0 }
//!
//! [dw]
//! "G23N-H" = 2.0
//! ```
//!
//! Method file:
//!
//! ```toml
//! [[section]]
//! name = "residue specific"
//! fitmethod = "leastsq"
//! [section.parameters]
//! pb = "fix"
//! "r_nxy__a24n*" = "r_nxy__g23n__b600.0__t25.0"
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::data::Resonance;
use crate::domain::{CpmgVariant, ExperimentSettings, FitMethod};
use crate::error::AppError;
use crate::fit::FitSection;
use crate::params::{Directive, Parameter, ParameterSet, Status};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentFile {
    pub experiment: ExperimentHeader,
    #[serde(default)]
    pub experimental_parameters: ExperimentSettings,
    pub data: DataSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentHeader {
    pub name: String,
    pub variant: CpmgVariant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    /// Directory of the measurement files, relative to the experiment file.
    pub path: Option<PathBuf>,
    /// Peak assignment → measurement file.
    #[serde(default)]
    pub profiles: IndexMap<String, PathBuf>,
}

/// A value in a parameters file: either a bare number or a table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Value(f64),
    Detailed {
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
}

impl ParamValue {
    fn apply(&self, param: &mut Parameter) {
        match self {
            ParamValue::Value(v) => param.value = param.clamp(*v),
            ParamValue::Detailed { value, min, max } => {
                if min.is_some() {
                    param.min = *min;
                }
                if max.is_some() {
                    param.max = *max;
                }
                param.value = param.clamp(value.unwrap_or(param.value));
            }
        }
    }
}

/// Table name → entry → value, in file order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ParametersFile {
    pub tables: IndexMap<String, IndexMap<String, ParamValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodFile {
    #[serde(default)]
    section: Vec<SectionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionEntry {
    name: Option<String>,
    fitmethod: Option<String>,
    #[serde(default)]
    parameters: IndexMap<String, String>,
}

fn parse_toml<T: DeserializeOwned>(text: &str, origin: &str) -> Result<T, AppError> {
    toml::from_str(text).map_err(|e| AppError::config(format!("Failed to parse '{origin}': {e}")))
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to read '{}': {e}", path.display())))?;
    parse_toml(&text, &path.display().to_string())
}

pub fn parse_experiment_file(text: &str, origin: &str) -> Result<ExperimentFile, AppError> {
    parse_toml(text, origin)
}

pub fn read_experiment_file(path: &Path) -> Result<ExperimentFile, AppError> {
    read_toml(path)
}

pub fn parse_parameters_file(text: &str, origin: &str) -> Result<ParametersFile, AppError> {
    parse_toml(text, origin)
}

pub fn read_parameters_file(path: &Path) -> Result<ParametersFile, AppError> {
    read_toml(path)
}

pub fn parse_method_file(text: &str, origin: &str) -> Result<Vec<FitSection>, AppError> {
    let file: MethodFile = parse_toml(text, origin)?;
    file.section
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let name = entry.name.unwrap_or_else(|| format!("Section {}", i + 1));
            let fitmethod = entry
                .fitmethod
                .as_deref()
                .map(|m| m.parse::<FitMethod>())
                .transpose()
                .map_err(|e| AppError::config(format!("In section [{name}]: {e}")))?;
            let directives = entry
                .parameters
                .iter()
                .map(|(pattern, status)| Directive::new(pattern, Status::parse(status)))
                .collect();
            Ok(FitSection {
                name,
                fitmethod,
                directives,
            })
        })
        .collect()
}

pub fn read_method_file(path: &Path) -> Result<Vec<FitSection>, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to read '{}': {e}", path.display())))?;
    parse_method_file(&text, &path.display().to_string())
}

/// Apply a parameters file to the registered parameters.
///
/// Every entry must match at least one parameter.
pub fn apply_parameters(params: &mut ParameterSet, file: &ParametersFile) -> Result<(), AppError> {
    for (table, entries) in &file.tables {
        let table_lc = table.trim().to_ascii_lowercase();
        for (key, value) in entries {
            let targets = if table_lc == "global" {
                global_targets(params, key)
            } else {
                let nucleus = Resonance::parse(key)?.nucleus_label();
                params
                    .iter()
                    .filter(|(_, p)| p.name.name == table_lc && p.name.nuclei.as_deref() == Some(nucleus.as_str()))
                    .map(|(k, _)| k.clone())
                    .collect()
            };
            if targets.is_empty() {
                return Err(AppError::config(format!(
                    "Parameter '{key}' in table [{table}] matches no parameter of the loaded experiments."
                )));
            }
            for name in &targets {
                if let Some(p) = params.get_mut(name) {
                    value.apply(p);
                }
            }
            log::debug!("[{table}] {key}: {} parameter(s) set", targets.len());
        }
    }
    params.update_constraints()
}

fn global_targets(params: &ParameterSet, key: &str) -> Vec<String> {
    let key = key.trim().to_ascii_lowercase();
    if key.contains("__") {
        return if params.contains(&key) { vec![key] } else { Vec::new() };
    }
    params
        .iter()
        .filter(|(_, p)| p.name.name == key)
        .map(|(k, _)| k.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CPMG_N_PARAMS;
    use crate::params::{Parameter, ParameterName};

    fn registered() -> ParameterSet {
        let mut params = ParameterSet::new();
        for nucleus in ["g23n", "a24n"] {
            for spec in CPMG_N_PARAMS {
                let name = ParameterName::scoped(spec.short, spec.scope, nucleus, 600.0, 25.0);
                params.insert(Parameter::from_spec(spec, name));
            }
        }
        params
    }

    #[test]
    fn experiment_file_shape() {
        let exp = parse_experiment_file(
            r#"
            [experiment]
            name = "cpmg_600"
            variant = "n_cw_y"

            [experimental_parameters]
            h_larmor_frq = 600.0
            temperature = 25.0
            time_t2 = 0.04
            pw = 35e-6
            carrier = 118.0

            [data]
            path = "600"
            [data.profiles]
            "G23N-H" = "g23.csv"
            "A24N-H" = "a24.csv"
            "#,
            "exp.toml",
        )
        .unwrap();
        assert_eq!(exp.experiment.variant, CpmgVariant::NCwY);
        assert_eq!(exp.experimental_parameters.carrier, Some(118.0));
        assert_eq!(exp.experimental_parameters.time_equil, None);
        let peaks: Vec<&String> = exp.data.profiles.keys().collect();
        assert_eq!(peaks, ["G23N-H", "A24N-H"]);
    }

    #[test]
    fn unknown_experimental_parameter_is_rejected() {
        let err = parse_experiment_file(
            r#"
            [experiment]
            name = "x"
            variant = "n_ip"
            [experimental_parameters]
            b1_frq = 1.0
            [data]
            "#,
            "exp.toml",
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn parameters_file_sets_values_and_bounds() {
        let mut params = registered();
        let file = parse_parameters_file(
            r#"
            [global]
            pb = 0.1
            kex = { value = 500, min = 10.0, max = 1e4 }
            "r_nxy__g23n__b600.0__t25.0" = 7.0

            [dw]
            "A24N-H" = 2.5
            "#,
            "params.toml",
        )
        .unwrap();
        apply_parameters(&mut params, &file).unwrap();
        assert_eq!(params.value("pb__t25.0"), Some(0.1));
        let kex = params.get("kex__t25.0").unwrap();
        assert_eq!((kex.value, kex.min, kex.max), (500.0, Some(10.0), Some(1e4)));
        assert_eq!(params.value("r_nxy__g23n__b600.0__t25.0"), Some(7.0));
        assert_eq!(params.value("r_nxy__a24n__b600.0__t25.0"), Some(5.0));
        assert_eq!(params.value("dw__a24n"), Some(2.5));
        assert_eq!(params.value("dw__g23n"), Some(0.0));
    }

    #[test]
    fn values_are_clamped_to_bounds() {
        let mut params = registered();
        let file = parse_parameters_file("[global]\npb = 1.5\n", "params.toml").unwrap();
        apply_parameters(&mut params, &file).unwrap();
        assert_eq!(params.value("pb__t25.0"), Some(1.0));
    }

    #[test]
    fn unmatched_entry_is_a_config_error() {
        let mut params = registered();
        let file = parse_parameters_file("[dw]\n\"L99N-H\" = 1.0\n", "params.toml").unwrap();
        let err = apply_parameters(&mut params, &file).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert!(err.message().contains("L99N-H"));
    }

    #[test]
    fn method_file_sections_keep_order() {
        let sections = parse_method_file(
            r#"
            [[section]]
            name = "fixed exchange"
            [section.parameters]
            pb = "fix"
            kex = "FIX"

            [[section]]
            fitmethod = "nelder"
            [section.parameters]
            "*" = "vary"
            "dw__a24n" = "dw__g23n"
            "#,
            "method.toml",
        )
        .unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "fixed exchange");
        assert_eq!(sections[0].fitmethod, None);
        assert_eq!(sections[0].directives[1], Directive::new("kex", Status::Fix));
        assert_eq!(sections[1].name, "Section 2");
        assert_eq!(sections[1].fitmethod, Some(FitMethod::Nelder));
        assert_eq!(sections[1].directives[1].status, Status::Expr("dw__g23n".to_string()));
    }

    #[test]
    fn invalid_fitmethod_names_the_section() {
        let err = parse_method_file(
            "[[section]]\nname = \"step 1\"\nfitmethod = \"brute\"\n",
            "method.toml",
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert!(err.message().contains("[step 1]"));
        assert!(err.message().contains("brute"));
    }
}
