//! Compact child handles.
//!
//! A `ChildSlot` always carries `(move, prior)` so a freshly expanded parent
//! records every candidate cheaply; the full `Node` is allocated only when a
//! child is actually visited. Inflation races resolve through the one-shot
//! cell: exactly one allocation wins and every thread observes it.
//!
//! The slot prior is written once at expansion time and never mutated, so it
//! doubles as the *static prior* snapshot the move selector consults; root
//! Dirichlet noise perturbs only the inflated node's search prior.

use std::sync::OnceLock;

use gz_core::{Color, Vertex};

use crate::node::Node;

pub struct ChildSlot {
    vertex: Vertex,
    prior: f32,
    node: OnceLock<Box<Node>>,
}

impl ChildSlot {
    pub fn new(vertex: Vertex, prior: f32) -> Self {
        Self {
            vertex,
            prior,
            node: OnceLock::new(),
        }
    }

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    /// The expansion-time prior, untouched by noise.
    pub fn static_prior(&self) -> f32 {
        self.prior
    }

    /// The search prior: the inflated node's (possibly noised) value, or the
    /// slot prior while uninflated.
    pub fn policy(&self) -> f32 {
        match self.node.get() {
            Some(node) => node.policy(),
            None => self.prior,
        }
    }

    pub fn is_inflated(&self) -> bool {
        self.node.get().is_some()
    }

    /// Allocate the full node if nobody has yet; idempotent under races.
    pub fn inflate(&self) -> &Node {
        self.node
            .get_or_init(|| Box::new(Node::new(self.vertex, self.prior)))
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.get().map(|b| b.as_ref())
    }

    pub fn node_mut(&mut self) -> Option<&mut Node> {
        self.node.get_mut().map(|b| b.as_mut())
    }

    /// Detach the owned node, if any. Used when this child becomes the new
    /// root.
    pub fn take_node(&mut self) -> Option<Box<Node>> {
        self.node.take()
    }

    pub fn visits(&self) -> u32 {
        self.node.get().map(|n| n.visits()).unwrap_or(0)
    }

    pub fn valid(&self) -> bool {
        self.node.get().map(|n| n.valid()).unwrap_or(true)
    }

    pub fn active(&self) -> bool {
        self.node.get().map(|n| n.active()).unwrap_or(true)
    }

    pub fn is_expanding(&self) -> bool {
        self.node.get().map(|n| n.is_expanding()).unwrap_or(false)
    }

    /// Virtual-loss-adjusted winrate. Only meaningful once visited.
    pub fn eval(&self, color: Color) -> f32 {
        match self.node.get() {
            Some(node) if node.visits() > 0 => node.eval(color),
            _ => 0.0,
        }
    }
}
