//! Board vertices and sentinel moves.

use std::fmt;

/// A board vertex as handed out by the rules engine, plus the sentinel
/// moves every `GameState` understands.
///
/// The numeric payload is opaque to the search: only the rules engine maps
/// vertices to board geometry. Sentinels use negative values so they can
/// never collide with a real intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex(pub i32);

impl Vertex {
    /// The pass move.
    pub const PASS: Vertex = Vertex(-1);
    /// Resignation. Never produced by the search tree itself.
    pub const RESIGN: Vertex = Vertex(-2);
    /// "No move": the vertex carried by a root node.
    pub const NONE: Vertex = Vertex(-3);

    pub fn is_pass(self) -> bool {
        self == Vertex::PASS
    }

    pub fn is_sentinel(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Vertex::PASS => write!(f, "pass"),
            Vertex::RESIGN => write!(f, "resign"),
            Vertex::NONE => write!(f, "none"),
            Vertex(v) => write!(f, "v{v}"),
        }
    }
}
