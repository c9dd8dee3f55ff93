//! Fit parameters.
//!
//! - `name`: long parameter names and cluster labels
//! - `set`: ordered parameter sets, expression constraints, two-phase staging
//! - `expr`: constraint expression parser
//! - `status`: fix / vary / expression directives

pub mod expr;
pub mod name;
pub mod set;
pub mod status;

pub use expr::*;
pub use name::*;
pub use set::*;
pub use status::*;
