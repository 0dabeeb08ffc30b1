//! The searcher: one simulation end-to-end, and the worker loop that runs
//! simulations until the stop predicate fires.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use gz_core::config::SearchConfig;
use gz_core::GameState;
use gz_eval::{EvalError, Evaluator};

use crate::node::{ExpandError, Expansion, Node};
use crate::time::TimeBudget;
use crate::tree::Tree;

/// State shared by every searcher thread of one search.
pub struct SearchShared<'a, G, E> {
    pub tree: &'a Tree,
    pub root_state: &'a G,
    pub evaluator: &'a E,
    pub cfg: &'a SearchConfig,
    /// Cleared to interrupt the search.
    pub running: &'a AtomicBool,
    /// Completed simulations. Failed simulations do not count.
    pub playouts: &'a AtomicU32,
    pub budget: TimeBudget,
    /// First fatal evaluator error, if any.
    pub failure: &'a Mutex<Option<EvalError>>,
}

impl<'a, G: GameState, E: Evaluator<G>> SearchShared<'a, G, E> {
    /// The stop predicate, polled between simulations.
    pub fn keep_running(&self) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }
        let visits = self.cfg.max_visits;
        if visits != 0 && self.tree.root().visits() >= visits {
            return false;
        }
        let playouts = self.cfg.max_playouts;
        if playouts != 0 && self.playouts.load(Ordering::Relaxed) >= playouts {
            return false;
        }
        !self.budget.expired()
    }

    fn record_failure(&self, e: EvalError) {
        let mut slot = self.failure.lock().unwrap();
        if slot.is_none() {
            *slot = Some(e);
        }
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Worker body: run simulations until told to stop. A fatal evaluator error
/// stops every worker and is parked for the controller.
pub fn run_searcher<G: GameState, E: Evaluator<G>>(shared: &SearchShared<'_, G, E>) {
    while shared.keep_running() {
        let mut state = shared.root_state.clone();
        match play_simulation(&mut state, shared.tree.root(), shared, true) {
            Ok(Some(_)) => {
                shared.playouts.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {}
            Err(e) => {
                shared.record_failure(e);
                return;
            }
        }
    }
}

/// Score a finished game as a Black-POV value.
fn scored_value<G: GameState>(state: &G) -> f32 {
    let score = state.final_score();
    if score > 0.0 {
        1.0
    } else if score < 0.0 {
        0.0
    } else {
        0.5
    }
}

/// One simulation from `node` downward.
///
/// Virtual loss brackets the whole visit: added on entry, undone on every
/// exit path. `Ok(Some(v))` is a completed simulation whose value was backed
/// up into this node; `Ok(None)` is an aborted one. `Err` carries only fatal
/// evaluator failures.
pub fn play_simulation<G: GameState, E: Evaluator<G>>(
    state: &mut G,
    node: &Node,
    shared: &SearchShared<'_, G, E>,
    is_root: bool,
) -> Result<Option<f32>, EvalError> {
    node.virtual_loss_add();
    let result = descend(state, node, shared, is_root);
    if let Ok(Some(value)) = &result {
        node.update(*value);
    }
    node.virtual_loss_undo();
    result
}

fn descend<G: GameState, E: Evaluator<G>>(
    state: &mut G,
    node: &Node,
    shared: &SearchShared<'_, G, E>,
    is_root: bool,
) -> Result<Option<f32>, EvalError> {
    if state.is_over() {
        return Ok(Some(scored_value(state)));
    }

    if node.expandable(0.0) && shared.tree.counter().can_grow() {
        match node.expand(shared.evaluator, state, 0.0, shared.tree.counter()) {
            Ok(Expansion::Expanded(value)) => return Ok(Some(value)),
            Ok(Expansion::Terminal) => return Ok(Some(scored_value(state))),
            Ok(Expansion::NotExpanded) => {}
            Err(ExpandError::TreeFull) => return Ok(None),
            Err(ExpandError::Evaluator(e)) if e.is_fatal() => return Err(e),
            Err(ExpandError::Evaluator(_)) => return Ok(None),
        }
    }

    if !node.has_children() {
        return Ok(None);
    }
    let color = state.to_move();
    match node.select_child(color, is_root, shared.cfg) {
        Some(slot) => {
            let child = slot.inflate();
            state.play(color, slot.vertex());
            play_simulation(state, child, shared, false)
        }
        None => Ok(None),
    }
}
