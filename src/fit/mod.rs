//! Fitting.
//!
//! - `minimizer`: objective boundary, Levenberg–Marquardt and Nelder–Mead
//! - `clusters`: decomposition into independently minimizable sub-problems
//! - `driver`: fit sections, cluster loop, global reconciliation
//! - `replicates`: bootstrap / Monte-Carlo refits (parallel)

pub mod clusters;
pub mod driver;
pub mod minimizer;
pub mod replicates;

pub use clusters::*;
pub use driver::*;
pub use minimizer::*;
pub use replicates::*;
