//! gz-eval: the network evaluator seam and its bounded result cache.

pub mod cache;
pub mod evaluator;


pub use cache::{CachedEvaluator, EvalCache};
pub use evaluator::{EvalError, Evaluator, NetOutput, Symmetry, UniformEvaluator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
