//! The `cpmg fit` pipeline from TOML/CSV input files to result files.

use std::fs;
use std::path::{Path, PathBuf};

use cpmg_fit::app::pipeline::{load_inputs, run_fit};
use cpmg_fit::cli::FitArgs;
use cpmg_fit::data::{ExperimentContext, MeasurementRecord, Profile};
use cpmg_fit::domain::{CpmgVariant, ExperimentSettings, FitMethod};
use cpmg_fit::error::{EXIT_CONFIG, EXIT_INTERRUPTED};
use cpmg_fit::fit::Interrupt;
use cpmg_fit::params::ParameterSet;

const NCYCS: [i64; 8] = [0, 1, 2, 4, 6, 10, 20, 40];
const PEAKS: [&str; 2] = ["G23N-H", "A24N-H"];

fn settings() -> ExperimentSettings {
    ExperimentSettings {
        h_larmor_frq: Some(600.0),
        temperature: Some(25.0),
        time_t2: Some(0.04),
        pw: Some(35e-6),
        carrier: Some(118.0),
        ..Default::default()
    }
}

/// Write an experiment file plus one CSV per peak generated from the model.
fn write_inputs(dir: &Path) -> PathBuf {
    let context = ExperimentContext {
        name: "cpmg_600".to_string(),
        variant: CpmgVariant::NIp,
        settings: settings(),
    };
    let data_dir = dir.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let mut truth = ParameterSet::new();
    let mut profiles = Vec::new();
    for peak in PEAKS {
        let profile = Profile::new(
            &context,
            MeasurementRecord {
                peak: peak.to_string(),
                ncycs: NCYCS.to_vec(),
                intensities: vec![1.0; NCYCS.len()],
                errors: vec![1.0; NCYCS.len()],
            },
        )
        .unwrap();
        for p in profile.default_parameters() {
            truth.insert(p.clone());
        }
        profiles.push(profile);
    }
    truth.set_value("pb__t25.0", 0.05).unwrap();
    truth.set_value("kex__t25.0", 500.0).unwrap();
    truth.set_value("dw__g23n", 2.0).unwrap();
    truth.set_value("dw__a24n", 1.0).unwrap();

    let mut listing = String::new();
    for (peak, mut profile) in PEAKS.iter().zip(profiles) {
        let curve = profile.predict(&truth).unwrap();
        let mut csv = String::from("ncyc,intensity,error\n");
        for (ncyc, v) in NCYCS.iter().zip(&curve) {
            csv.push_str(&format!("{ncyc},{},{}\n", v * 1.0e5, 500.0));
        }
        let file = format!("{}.csv", peak.to_lowercase());
        fs::write(data_dir.join(&file), csv).unwrap();
        listing.push_str(&format!("\"{peak}\" = \"{file}\"\n"));
    }

    let experiment = format!(
        r#"[experiment]
name = "cpmg_600"
variant = "n_ip"

[experimental_parameters]
h_larmor_frq = 600.0
temperature = 25.0
time_t2 = 0.04
pw = 35e-6
carrier = 118.0

[data]
path = "data"
[data.profiles]
{listing}"#
    );
    let path = dir.join("experiment.toml");
    fs::write(&path, experiment).unwrap();
    path
}

fn args(dir: &Path, experiment: PathBuf) -> FitArgs {
    FitArgs {
        experiments: vec![experiment],
        parameters: Vec::new(),
        method: None,
        output: dir.join("Output"),
        fitmethod: FitMethod::LeastSq,
        include: Vec::new(),
        exclude: Vec::new(),
        mc: None,
        bs: None,
        seed: 42,
    }
}

#[test]
fn parameter_file_and_filters_shape_the_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = write_inputs(dir.path());
    let params_path = dir.path().join("parameters.toml");
    fs::write(
        &params_path,
        "[global]\nkex = { value = 450.0, min = 1.0 }\n\n[dw]\n\"G23N-H\" = 1.8\n\"A24N-H\" = 0.9\n",
    )
    .unwrap();

    let mut fit_args = args(dir.path(), experiment);
    fit_args.parameters = vec![params_path];
    fit_args.include = vec!["23".to_string()];
    let inputs = load_inputs(&fit_args).unwrap();

    assert_eq!(inputs.data.len(), 1);
    assert_eq!(inputs.params.value("kex__t25.0"), Some(450.0));
    assert_eq!(inputs.params.value("dw__g23n"), Some(1.8));
    // Parameters of excluded residues are dropped.
    assert!(!inputs.params.contains("dw__a24n"));
    assert_eq!(inputs.params.value("cs__g23n__t25.0"), Some(118.0));
    assert!(inputs.sections.is_empty());
}

#[test]
fn fit_writes_result_files() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = write_inputs(dir.path());
    let method_path = dir.path().join("method.toml");
    fs::write(
        &method_path,
        "[[section]]\nname = \"start\"\n[section.parameters]\ndw__a24n = \"vary\"\n",
    )
    .unwrap();
    let params_path = dir.path().join("parameters.toml");
    fs::write(&params_path, "[global]\nkex = 400.0\ndw = 1.5\n").unwrap();

    let mut fit_args = args(dir.path(), experiment);
    fit_args.method = Some(method_path);
    fit_args.parameters = vec![params_path];
    fit_args.bs = Some(3);
    let run = run_fit(&fit_args, &Interrupt::new()).unwrap();
    assert!(!run.outcome.interrupted);

    let out = dir.path().join("Output");
    let statistics = fs::read_to_string(out.join("statistics.fit")).unwrap();
    assert!(statistics.starts_with("# Number of data points: 16\n"));
    assert!(statistics.contains("# Fitting method: leastsq\n"));
    assert!(statistics.contains("reduced chi-square = "));

    let parameters = fs::read_to_string(out.join("parameters.fit")).unwrap();
    assert!(parameters.contains("kex__t25.0"));
    assert!(parameters.contains("(fixed)"));

    let report = fs::read_to_string(out.join("Data").join("cpmg_600.dat")).unwrap();
    assert!(report.starts_with("[G23N-H]\n"));
    assert!(report.contains("[A24N-H]\n"));
    assert!(!report.contains("XXX"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("results.json")).unwrap()).unwrap();
    assert_eq!(json["method"], "leastsq");
    assert!(json["parameters"]["kex__t25.0"]["value"].as_f64().is_some());
    let redchi = json["redchi"].as_f64().unwrap();
    assert!(redchi < 1.0, "redchi = {redchi}");

    let replicates = run.replicates.unwrap();
    assert_eq!(replicates.rows.len(), 3);
    assert!(out.join("Bootstrap").join("replicates.csv").exists());
    assert!(out.join("Bootstrap").join("summary.fit").exists());
}

#[test]
fn interrupted_fit_still_writes_results() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = write_inputs(dir.path());
    let fit_args = args(dir.path(), experiment);

    let interrupt = Interrupt::new();
    interrupt.trigger();
    let err = run_fit(&fit_args, &interrupt).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_INTERRUPTED);
    assert!(dir.path().join("Output").join("statistics.fit").exists());
}

#[test]
fn unknown_residue_in_parameter_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let experiment = write_inputs(dir.path());
    let params_path = dir.path().join("parameters.toml");
    fs::write(&params_path, "[dw]\n\"K99N-H\" = 1.0\n").unwrap();

    let mut fit_args = args(dir.path(), experiment);
    fit_args.parameters = vec![params_path];
    let err = load_inputs(&fit_args).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_CONFIG);
}
