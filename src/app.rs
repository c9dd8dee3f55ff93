//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real entry point:
//! - parses CLI arguments
//! - sets up logging and the Ctrl-C handler
//! - dispatches to the fit pipeline or the `info` pages

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, InfoArgs};
use crate::error::AppError;
use crate::fit::Interrupt;

pub mod pipeline;

/// Entry point for the `cpmg` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Info(args) => handle_info(args),
    }
}

fn init_logging() {
    // `RUST_LOG` overrides the default level.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.trigger()) {
        log::warn!("Could not install the Ctrl-C handler: {e}");
    }

    let run = pipeline::run_fit(&args, &interrupt)?;
    let result = &run.outcome.result;
    log::info!(
        "Done: {} function evaluation(s), reduced chi-square {:.3e}",
        result.nfev,
        result.redchi
    );
    if let Some(set) = &run.replicates {
        log::info!("{} replicate fit(s) completed", set.rows.len());
    }
    Ok(())
}

fn handle_info(args: InfoArgs) -> Result<(), AppError> {
    let text = match args.variant {
        Some(variant) => crate::report::format_variant_info(variant),
        None => crate::report::format_variant_list(),
    };
    println!("{text}");
    Ok(())
}
