//! Mathematical utilities: least squares, propagator algebra and distributions.

pub mod linalg;
pub mod ols;
pub mod stats;

pub use linalg::*;
pub use ols::*;
pub use stats::*;
