//! Measured data.
//!
//! - `resonance`: peak assignment parsing
//! - `profile`: one intensity series, its prediction and replicates
//! - `dataset`: ordered profiles and the aggregate residual vector

pub mod dataset;
pub mod profile;
pub mod resonance;

pub use dataset::*;
pub use profile::*;
pub use resonance::*;
