//! The evaluator interface consumed by the search.

use gz_core::GameState;
use thiserror::Error;

/// Symmetry ensemble handed to the network for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symmetry {
    /// Evaluate the position as-is.
    Identity,
    /// The network picks one of the board symmetries at random.
    Random,
    /// Average over all symmetries.
    Average,
}

/// Raw network output for one position.
///
/// `policy[i]` is the probability for the intersection at
/// `(x = i % size, y = i / size)`; `pass` is the probability of passing.
/// `winrate` is expressed from the side to move's perspective; the search
/// flips it to Black's viewpoint internally.
#[derive(Debug, Clone)]
pub struct NetOutput {
    pub policy: Vec<f32>,
    pub pass: f32,
    pub winrate: f32,
}

#[derive(Error, Debug)]
pub enum EvalError {
    /// A single evaluation failed; the simulation is abandoned and the
    /// search continues.
    #[error("transient evaluator failure: {0}")]
    Transient(String),
    /// The evaluator is unusable (bad weights, device initialization). The
    /// whole search stops.
    #[error("fatal evaluator failure: {0}")]
    Fatal(String),
}

impl EvalError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::Fatal(_))
    }
}

/// One operation: position in, policy + winrate out.
pub trait Evaluator<G: GameState>: Send + Sync {
    fn evaluate(&self, state: &G, symmetry: Symmetry) -> Result<NetOutput, EvalError>;
}

/// Uniform policy, even winrate. Baseline stub for tests and benches.
pub struct UniformEvaluator;

impl<G: GameState> Evaluator<G> for UniformEvaluator {
    fn evaluate(&self, state: &G, _symmetry: Symmetry) -> Result<NetOutput, EvalError> {
        let n = state.num_intersections();
        let p = 1.0 / (n as f32 + 1.0);
        Ok(NetOutput {
            policy: vec![p; n],
            pass: p,
            winrate: 0.5,
        })
    }
}
