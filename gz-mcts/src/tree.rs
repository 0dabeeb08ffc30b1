//! The shared search tree: root node, node budget, root preparation, and
//! re-rooting.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use rand_distr::{Distribution, Gamma};

use gz_core::config::NoiseConfig;
use gz_core::{GameState, Vertex};
use gz_eval::Evaluator;

use crate::node::{ExpandError, Expansion, Node};
use crate::SearchError;

/// Global count of materialized child slots against a configurable bound.
/// Expansion refuses to grow the tree past the bound.
pub struct NodeCounter {
    count: AtomicUsize,
    max: AtomicUsize,
}

impl NodeCounter {
    pub fn new(max: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            max: AtomicUsize::new(max.max(1)),
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    pub fn set_max(&self, max: usize) {
        self.max.store(max.max(1), Ordering::Relaxed);
    }

    /// Coarse pre-check used by searchers before attempting expansion.
    pub fn can_grow(&self) -> bool {
        self.current() < self.max()
    }

    /// Reserve room for `n` more slots; false if that would overflow.
    pub fn try_grow(&self, n: usize) -> bool {
        let max = self.max();
        let mut cur = self.count.load(Ordering::Relaxed);
        loop {
            let next = cur + n;
            if next > max {
                return false;
            }
            match self
                .count
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(seen) => cur = seen,
            }
        }
    }

    fn set(&self, n: usize) {
        self.count.store(n, Ordering::Relaxed);
    }
}

pub struct Tree {
    root: Box<Node>,
    counter: NodeCounter,
}

impl Tree {
    pub fn new(max_nodes: usize) -> Self {
        Self {
            root: Box::new(Node::new(Vertex::NONE, 1.0)),
            counter: NodeCounter::new(max_nodes),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn counter(&self) -> &NodeCounter {
        &self.counter
    }

    pub fn node_count(&self) -> usize {
        self.counter.current()
    }

    pub fn set_max_nodes(&self, max: usize) {
        self.counter.set_max(max);
    }

    /// Drop the whole tree, keeping the budget.
    pub fn clear(&mut self) {
        self.root = Box::new(Node::new(Vertex::NONE, 1.0));
        self.counter.set(0);
    }

    /// Make the root ready for a search from `state`:
    /// expand it if it has no children yet, invalidate superko children,
    /// optionally mix root Dirichlet noise into the priors, and inflate
    /// every child so callers can read their statistics.
    pub fn prepare_root<G: GameState, E: Evaluator<G>>(
        &mut self,
        state: &G,
        evaluator: &E,
        noise: &NoiseConfig,
        rng: &mut impl Rng,
    ) -> Result<(), SearchError> {
        if state.is_over() {
            return Err(SearchError::GameOver);
        }

        if !self.root.has_children() {
            match self.root.expand(evaluator, state, 0.0, &self.counter) {
                Ok(Expansion::Expanded(_)) | Ok(Expansion::NotExpanded) => {}
                Ok(Expansion::Terminal) => return Err(SearchError::GameOver),
                Err(ExpandError::TreeFull) => {
                    return Err(SearchError::Config(gz_core::ConfigError::Memory(
                        "node budget too small to expand the root".to_string(),
                    )))
                }
                Err(ExpandError::Evaluator(e)) => return Err(SearchError::Evaluator(e)),
            }
        }
        if !self.root.has_children() {
            return Err(SearchError::GameOver);
        }

        self.kill_superkos(state);

        if noise.enabled {
            self.root.inflate_all_children();
            dirichlet_noise(&mut self.root, noise.epsilon, noise.alpha, rng);
        }

        self.root.inflate_all_children();
        Ok(())
    }

    /// Replay each candidate in a throwaway state and invalidate the moves
    /// the rules engine reports as superko violations.
    fn kill_superkos<G: GameState>(&mut self, state: &G) {
        let to_move = state.to_move();
        for slot in self.root.children_mut() {
            let vertex = slot.vertex();
            if vertex == Vertex::PASS {
                continue;
            }
            let mut probe = state.clone();
            probe.play(to_move, vertex);
            if probe.is_superko() {
                slot.inflate().invalidate();
            }
        }
    }

    /// Promote the child reached by `vertex` to be the new root, releasing
    /// every sibling subtree. Returns whether the played move was found in
    /// the tree (statistics preserved).
    pub fn advance_root(&mut self, vertex: Vertex) -> bool {
        let mut found = false;
        let mut new_root: Option<Box<Node>> = None;
        for slot in self.root.children_mut() {
            if slot.vertex() == vertex {
                found = true;
                new_root = slot.take_node();
                break;
            }
        }

        self.root = new_root.unwrap_or_else(|| Box::new(Node::new(vertex, 1.0)));
        // Siblings and the old root were dropped above; recount what's left
        // and let still-widenable nodes expand again.
        let kept = self.root.count_nodes_and_clear_expand_state();
        self.counter.set(kept);
        found
    }
}

/// `prior <- (1-eps)*prior + eps*Dirichlet(alpha)` over the root children.
/// Children must already be inflated.
fn dirichlet_noise(root: &mut Node, epsilon: f32, alpha: f32, rng: &mut impl Rng) {
    if !(alpha.is_finite() && alpha > 0.0) || !(0.0..=1.0).contains(&epsilon) {
        return;
    }
    let children = root.children_mut();
    if children.is_empty() {
        return;
    }

    // Gamma(alpha, 1) per child, normalized, is a Dirichlet sample.
    let Ok(gamma) = Gamma::new(alpha as f64, 1.0) else {
        return;
    };
    let mut eta: Vec<f64> = Vec::with_capacity(children.len());
    let mut sum = 0.0f64;
    for _ in 0..children.len() {
        let x: f64 = gamma.sample(rng);
        eta.push(x);
        sum += x;
    }
    if !(sum.is_finite() && sum > 0.0) {
        return;
    }

    for (slot, eta) in children.iter_mut().zip(eta) {
        let mixed = (1.0 - epsilon) * slot.policy() + epsilon * (eta / sum) as f32;
        if let Some(node) = slot.node_mut() {
            node.set_policy(mixed);
        }
    }
}
