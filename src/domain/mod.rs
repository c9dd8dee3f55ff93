//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - experiment variants and their declarative parameter tables (`CpmgVariant`, `ParamSpec`)
//! - experimental settings read from experiment files (`ExperimentSettings`)
//! - minimization method names (`FitMethod`)

pub mod types;

pub use types::*;
