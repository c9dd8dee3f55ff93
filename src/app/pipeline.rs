//! The `cpmg fit` workflow:
//! experiment files -> profiles -> parameters -> fit sections -> result files
//! -> optional replicate fits.

use std::path::Path;

use crate::cli::FitArgs;
use crate::data::Dataset;
use crate::error::AppError;
use crate::fit::{FitDriver, FitOutcome, FitSection, Interrupt, ReplicateKind, ReplicateSet, run_replicates};
use crate::io::{
    apply_parameters, load_experiment, read_experiment_file, read_method_file, read_parameters_file, write_outputs,
    write_replicates,
};
use crate::params::ParameterSet;
use crate::report::header1;

/// Everything a fit needs, loaded and validated.
#[derive(Debug, Clone)]
pub struct FitInputs {
    pub data: Dataset,
    pub params: ParameterSet,
    pub sections: Vec<FitSection>,
}

/// All computed outputs of one `cpmg fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outcome: FitOutcome,
    pub replicates: Option<ReplicateSet>,
}

/// Read experiment, parameters and method files.
///
/// Parameter files are applied before residue filtering so one file can
/// serve any `--include`/`--exclude` selection.
pub fn load_inputs(args: &FitArgs) -> Result<FitInputs, AppError> {
    let mut data = Dataset::new(Vec::new());
    for path in &args.experiments {
        let experiment = read_experiment_file(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        data.extend(Dataset::new(load_experiment(&experiment, base)?));
    }
    if data.is_empty() {
        return Err(AppError::data("No profiles were loaded."));
    }

    let mut params = ParameterSet::new();
    data.register_parameters(&mut params);
    for path in &args.parameters {
        let file = read_parameters_file(path)?;
        apply_parameters(&mut params, &file)?;
    }

    let data = data.filter_residues(&args.include, &args.exclude)?;
    params.retain_used(&data.param_names())?;

    let sections = match &args.method {
        Some(path) => read_method_file(path)?,
        None => Vec::new(),
    };

    Ok(FitInputs { data, params, sections })
}

/// Run the fit, write the result files and the optional replicate fits.
///
/// An interrupted fit still writes its results (at the best point reached)
/// before returning the interruption error.
pub fn run_fit(args: &FitArgs, interrupt: &Interrupt) -> Result<RunOutput, AppError> {
    let FitInputs {
        mut data,
        mut params,
        sections,
    } = load_inputs(args)?;

    println!("{}", header1("Data"));
    println!("{} profile(s), {} point(s)", data.len(), data.ndata());

    let driver = FitDriver::new(args.fitmethod, interrupt.clone());
    let outcome = driver.run(&mut data, &mut params, &sections)?;
    write_outputs(&args.output, &mut data, &outcome.result)?;

    if outcome.interrupted {
        return Err(AppError::interrupted(format!(
            "Fit interrupted; results at the best point found were written to '{}'.",
            args.output.display()
        )));
    }

    let replicates = match (args.mc, args.bs) {
        (Some(n), _) => Some((ReplicateKind::MonteCarlo, n)),
        (None, Some(n)) => Some((ReplicateKind::Bootstrap, n)),
        (None, None) => None,
    };
    let replicates = match replicates {
        Some((kind, count)) if count > 0 => {
            println!("{}", header1(kind.dir_name()));
            let set = run_replicates(
                kind,
                count,
                args.seed,
                &data,
                &outcome.result.params,
                &sections,
                &driver,
            )?;
            write_replicates(&args.output, &set)?;
            Some(set)
        }
        _ => None,
    };

    Ok(RunOutput { outcome, replicates })
}
