//! gz-mcts: parallel PUCT tree search over a shared tree, plus the
//! strength-control move selection layered on the root statistics.
//!
//! The tree uses the three-state expansion lock as the publication fence for
//! each node's children; every other per-node counter is a relaxed atomic.
//! Searchers are plain OS threads sharing one `Tree` through `&` references.

pub mod child;
pub mod control;
pub mod node;
pub mod search;
pub mod select;
pub mod time;
pub mod tree;

#[cfg(test)]
mod search_tests;
#[cfg(test)]
mod select_tests;

use gz_core::{Color, ConfigError};
use gz_eval::EvalError;
use thiserror::Error;

pub use child::ChildSlot;
pub use control::{Controller, StopHandle};
pub use node::{ExpandError, Expansion, Node, VIRTUAL_LOSS_COUNT};
pub use select::{select_move, Candidate, Selection, SelectionCase, SelectionParams};
pub use time::TimeBudget;
pub use tree::Tree;

/// Errors surfaced from a whole search. Per-simulation failures are absorbed
/// by the searchers and never reach this type.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Evaluator(#[from] EvalError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("the game is over; no move to search")]
    GameOver,
    #[error("it is not {0:?}'s turn")]
    OutOfTurn(Color),
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
