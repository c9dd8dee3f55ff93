//! Relaxation-dispersion simulation.
//!
//! - `liouvillian`: exchange/relaxation/RF generators
//! - `propagator`: Propagator Builder (matrix exponentials per pulse element)
//! - `observable`: Observable Calculator (pulse-sequence composition per variant)

pub mod liouvillian;
pub mod observable;
pub mod propagator;

pub use liouvillian::*;
pub use observable::*;
pub use propagator::*;
