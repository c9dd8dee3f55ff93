//! Input/output helpers.
//!
//! - TOML experiment, parameters and method files (`config`)
//! - measurement CSV ingest (`ingest`)
//! - result files (`export`)

pub mod config;
pub mod export;
pub mod ingest;

pub use config::*;
pub use export::*;
pub use ingest::*;
