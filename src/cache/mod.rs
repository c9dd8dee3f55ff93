//! Memoizing Evaluation Cache.
//!
//! - `lru`: bounded least-recently-used map
//! - `evaluation`: per-profile two-level cache (observables, propagators)

pub mod evaluation;
pub mod lru;

pub use evaluation::*;
pub use lru::*;
