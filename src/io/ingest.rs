//! Measurement ingest.
//!
//! One CSV file per peak with the columns `ncyc,intensity,error` (any order,
//! case-insensitive, `#` comment lines allowed). Rows that fail to parse are
//! skipped and reported; the remaining rows become a `MeasurementRecord` that
//! `Profile::new` validates.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use serde::Deserialize;

use crate::data::{ExperimentContext, MeasurementRecord, Profile};
use crate::error::AppError;
use crate::io::config::ExperimentFile;

const REQUIRED_COLUMNS: [&str; 3] = ["ncyc", "intensity", "error"];

#[derive(Debug, Deserialize)]
struct Row {
    ncyc: i64,
    intensity: f64,
    error: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// One measurement file after parsing.
#[derive(Debug, Clone)]
pub struct IngestedProfile {
    pub record: MeasurementRecord,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Read the measurement CSV of `peak`.
pub fn read_measurements(path: &Path, peak: &str) -> Result<IngestedProfile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open data file '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::data(format!("Failed to read CSV headers of '{}': {e}", path.display())))?;
    let headers = normalize_headers(headers);
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(AppError::data(format!(
                "Missing required column `{column}` in '{}'.",
                path.display()
            )));
        }
    }

    let mut record = MeasurementRecord {
        peak: peak.to_string(),
        ncycs: Vec::new(),
        intensities: Vec::new(),
        errors: Vec::new(),
    };
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = result
            .as_ref()
            .ok()
            .and_then(|r| r.position())
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        rows_read += 1;

        let row: Row = match result.and_then(|r| r.deserialize(Some(&headers))) {
            Ok(row) => row,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        record.ncycs.push(row.ncyc);
        record.intensities.push(row.intensity);
        record.errors.push(row.error);
    }

    for err in &row_errors {
        log::warn!("{}:{}: skipped row ({})", path.display(), err.line, err.message);
    }

    Ok(IngestedProfile {
        record,
        row_errors,
        rows_read,
    })
}

/// Build every profile listed in an experiment file.
///
/// Data paths are resolved against `base` (the experiment file's directory)
/// joined with the optional `[data] path`.
pub fn load_experiment(experiment: &ExperimentFile, base: &Path) -> Result<Vec<Profile>, AppError> {
    let context = ExperimentContext {
        name: experiment.experiment.name.clone(),
        variant: experiment.experiment.variant,
        settings: experiment.experimental_parameters.clone(),
    };
    let dir = match &experiment.data.path {
        Some(p) => base.join(p),
        None => base.to_path_buf(),
    };

    if experiment.data.profiles.is_empty() {
        return Err(AppError::data(format!(
            "Experiment '{}' lists no profiles.",
            context.name
        )));
    }

    let mut profiles = Vec::with_capacity(experiment.data.profiles.len());
    for (peak, file) in &experiment.data.profiles {
        let ingested = read_measurements(&dir.join(file), peak)?;
        let profile = Profile::new(&context, ingested.record)?;
        log::debug!("Loaded {}", profile.summary());
        profiles.push(profile);
    }
    log::info!(
        "Experiment '{}' ({}): {} profile(s)",
        context.name,
        context.variant.name(),
        profiles.len()
    );
    Ok(profiles)
}

fn normalize_headers(headers: &StringRecord) -> StringRecord {
    headers.iter().map(normalize_header_name).collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}
