//! `cpmg-fit` library crate.
//!
//! Simulation of CPMG relaxation-dispersion experiments for a two-state
//! exchanging spin system and least-squares fitting of measured profiles.
//! The binary (`cpmg`) is a thin wrapper around this library so the physics,
//! the fitting and the file formats are testable without spawning processes.

pub mod app;
pub mod cache;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod params;
pub mod report;
