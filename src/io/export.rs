//! Result files.
//!
//! ```text
//! <dir>/statistics.fit
//! <dir>/parameters.fit
//! <dir>/results.json
//! <dir>/Data/<experiment>.dat
//! <dir>/<Bootstrap|MonteCarlo>/replicates.csv
//! <dir>/<Bootstrap|MonteCarlo>/summary.fit
//! ```

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::data::Dataset;
use crate::error::AppError;
use crate::fit::{MinimizerResult, ReplicateSet};
use crate::report::{format_parameters, format_replicate_summary, format_statistics};

#[derive(Debug, Serialize)]
struct ParameterJson<'a> {
    value: f64,
    stderr: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    vary: bool,
    expr: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ResultsJson<'a> {
    method: &'a str,
    success: bool,
    message: &'a str,
    ndata: usize,
    nvarys: usize,
    nfev: usize,
    chisqr: f64,
    redchi: f64,
    chisq_p_value: f64,
    ks_p_value: f64,
    aic: f64,
    bic: f64,
    parameters: IndexMap<&'a str, ParameterJson<'a>>,
    /// Row-major, ordered as `var_names`.
    var_names: &'a [String],
    covariance: Option<Vec<Vec<f64>>>,
}

fn create_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path)
        .map_err(|e| AppError::config(format!("Failed to create directory '{}': {e}", path.display())))
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    fs::write(path, text).map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))
}

pub fn write_statistics(dir: &Path, result: &MinimizerResult) -> Result<PathBuf, AppError> {
    let path = dir.join("statistics.fit");
    write_text(&path, &format_statistics(result))?;
    Ok(path)
}

pub fn write_parameters(dir: &Path, result: &MinimizerResult) -> Result<PathBuf, AppError> {
    let path = dir.join("parameters.fit");
    write_text(&path, &format_parameters(&result.params))?;
    Ok(path)
}

pub fn write_results_json(dir: &Path, result: &MinimizerResult) -> Result<PathBuf, AppError> {
    let path = dir.join("results.json");
    let parameters: IndexMap<&str, ParameterJson> = result
        .params
        .iter()
        .map(|(name, p)| {
            (
                name.as_str(),
                ParameterJson {
                    value: p.value,
                    stderr: p.stderr,
                    min: p.min,
                    max: p.max,
                    vary: p.vary,
                    expr: p.expr.as_deref(),
                },
            )
        })
        .collect();
    let covariance: Option<Vec<Vec<f64>>> = result
        .covariance
        .as_ref()
        .map(|c| c.row_iter().map(|row| row.iter().copied().collect::<Vec<f64>>()).collect());
    let json = ResultsJson {
        method: result.method.name(),
        success: result.success,
        message: &result.message,
        ndata: result.ndata,
        nvarys: result.nvarys,
        nfev: result.nfev,
        chisqr: result.chisqr,
        redchi: result.redchi,
        chisq_p_value: result.chi2_p_value(),
        ks_p_value: result.ks_p_value(),
        aic: result.aic,
        bic: result.bic,
        parameters,
        var_names: &result.var_names,
        covariance,
    };

    let file = File::create(&path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &json)
        .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;
    Ok(path)
}

/// One `.dat` file per experiment with the profile reports.
pub fn write_profiles(dir: &Path, data: &mut Dataset, result: &MinimizerResult) -> Result<Vec<PathBuf>, AppError> {
    let data_dir = dir.join("Data");
    create_dir(&data_dir)?;
    let mut paths = Vec::new();
    for (experiment, text) in data.format_reports(Some(&result.params))? {
        let path = data_dir.join(format!("{experiment}.dat"));
        write_text(&path, &text)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Write every result file of one fit into `dir`.
pub fn write_outputs(dir: &Path, data: &mut Dataset, result: &MinimizerResult) -> Result<(), AppError> {
    create_dir(dir)?;
    write_statistics(dir, result)?;
    write_parameters(dir, result)?;
    write_results_json(dir, result)?;
    write_profiles(dir, data, result)?;
    log::info!("Results written to '{}'", dir.display());
    Ok(())
}

/// `replicates.csv` and `summary.fit` under `<dir>/<kind>/`.
pub fn write_replicates(dir: &Path, set: &ReplicateSet) -> Result<PathBuf, AppError> {
    let out = dir.join(set.kind.dir_name());
    create_dir(&out)?;

    let csv_path = out.join("replicates.csv");
    let file = File::create(&csv_path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", csv_path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    let csv_err = |e: csv::Error| AppError::config(format!("Failed to write '{}': {e}", csv_path.display()));

    let mut header = vec!["replicate".to_string()];
    header.extend(set.names.iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;
    for (i, row) in set.rows.iter().enumerate() {
        let mut record = vec![(i + 1).to_string()];
        record.extend(row.iter().map(|v| format!("{v:.10e}")));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", csv_path.display())))?;

    write_text(&out.join("summary.fit"), &format_replicate_summary(set))?;
    log::info!("Replicate results written to '{}'", out.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ReplicateKind;

    #[test]
    fn replicate_files_land_under_the_kind_directory() {
        let dir = tempfile::tempdir().unwrap();
        let set = ReplicateSet {
            kind: ReplicateKind::Bootstrap,
            names: vec!["kex__t25.0".into()],
            rows: vec![vec![500.0], vec![510.0], vec![490.0]],
        };
        let out = write_replicates(dir.path(), &set).unwrap();
        assert!(out.ends_with("Bootstrap"));

        let csv = fs::read_to_string(out.join("replicates.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "replicate,kex__t25.0");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("2,5.1"));
        assert!(out.join("summary.fit").exists());
    }
}
