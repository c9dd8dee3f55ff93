//! Command-line parsing.
//!
//! Argument parsing and command dispatch stay separate from the physics and
//! fitting code; `app` turns these structs into a run.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{CpmgVariant, FitMethod};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cpmg", version, about = "CPMG relaxation-dispersion fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit experiments to a two-state exchange model.
    Fit(FitArgs),
    /// Describe the supported experiments.
    Info(InfoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Experiment files (TOML); repeat for several experiments.
    #[arg(short = 'e', long = "experiments", value_name = "FILE", required = true, num_args = 1..)]
    pub experiments: Vec<PathBuf>,

    /// Parameter files (TOML) with initial values.
    #[arg(short = 'p', long = "parameters", value_name = "FILE", num_args = 1..)]
    pub parameters: Vec<PathBuf>,

    /// Method file (TOML) with the fit sections.
    #[arg(short = 'm', long = "method", value_name = "FILE")]
    pub method: Option<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = "Output")]
    pub output: PathBuf,

    /// Minimization method used by sections that do not name one.
    #[arg(long, value_enum, default_value_t = FitMethod::LeastSq)]
    pub fitmethod: FitMethod,

    /// Only fit these residues (e.g. `23`, `G23`, `G23N-H`).
    #[arg(long, value_name = "ID", num_args = 1.., conflicts_with = "exclude")]
    pub include: Vec<String>,

    /// Leave these residues out.
    #[arg(long, value_name = "ID", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Number of Monte-Carlo replicates (best-fit curves plus noise).
    #[arg(long = "mc", value_name = "N", conflicts_with = "bs")]
    pub mc: Option<usize>,

    /// Number of bootstrap replicates (resampled points).
    #[arg(long = "bs", value_name = "N")]
    pub bs: Option<usize>,

    /// Seed of the replicate generators.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args, Clone)]
pub struct InfoArgs {
    /// Experiment variant to describe; lists all variants when omitted.
    #[arg(value_enum)]
    pub variant: Option<CpmgVariant>,
}
