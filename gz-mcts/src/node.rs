//! Tree nodes: visit statistics, virtual losses, the expansion lock, and
//! PUCT child selection.
//!
//! All evaluations are stored from Black's point of view and flipped on read
//! for White. `expand_state` is the lock for `children`: the vector is only
//! written between a successful INITIAL→EXPANDING transition and the matching
//! EXPANDING→EXPANDED release, after which it is read-only until the node is
//! destroyed or reset between searches.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};

use gz_core::config::SearchConfig;
use gz_core::{Color, GameState, Vertex};
use gz_eval::{EvalError, Evaluator, Symmetry};
use thiserror::Error;

use crate::child::ChildSlot;
use crate::tree::NodeCounter;

/// Virtual losses added per in-flight traversal, to push concurrent
/// searchers toward other parts of the tree.
pub const VIRTUAL_LOSS_COUNT: i32 = 3;

/// `min_prior_ratio` value meaning "no children materialized yet"; any
/// requested ratio is below it.
const UNEXPANDED_RATIO: f32 = 2.0;

const STATUS_ACTIVE: u8 = 0;
const STATUS_PRUNED: u8 = 1;
const STATUS_INVALID: u8 = 2;

const EXPAND_INITIAL: u8 = 0;
const EXPAND_EXPANDING: u8 = 1;
const EXPAND_EXPANDED: u8 = 2;

/// Outcome of an expansion attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expansion {
    /// Children were materialized; the payload is the position's network
    /// value from Black's point of view, to be backed up as the leaf value.
    Expanded(f32),
    /// Nothing changed: another searcher holds the lock, or the requested
    /// widening is already satisfied.
    NotExpanded,
    /// The position has no successors; score it instead.
    Terminal,
}

#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("tree node budget exhausted")]
    TreeFull,
    #[error(transparent)]
    Evaluator(#[from] EvalError),
}

pub struct Node {
    vertex: Vertex,
    /// Search prior. Perturbed by root Dirichlet noise between searches;
    /// never written while searchers run.
    policy: f32,
    visits: AtomicU32,
    virtual_loss: AtomicI32,
    /// f64 bit pattern: sum of leaf values from Black's point of view.
    black_evals: AtomicU64,
    /// f32 bit pattern: the evaluator's value for this position, Black's POV.
    net_eval: AtomicU32,
    status: AtomicU8,
    expand_state: AtomicU8,
    /// f32 bit pattern; see `UNEXPANDED_RATIO`. 0.0 means fully expanded.
    min_prior_ratio: AtomicU32,
    children: UnsafeCell<Vec<ChildSlot>>,
}

// `children` is guarded by the expand_state protocol; everything else is
// atomic or immutable during a search.
unsafe impl Sync for Node {}
unsafe impl Send for Node {}

fn add_f64(cell: &AtomicU64, value: f64) {
    let mut cur = cell.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(cur) + value).to_bits();
        match cell.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(seen) => cur = seen,
        }
    }
}

impl Node {
    pub fn new(vertex: Vertex, policy: f32) -> Self {
        Self {
            vertex,
            policy,
            visits: AtomicU32::new(0),
            virtual_loss: AtomicI32::new(0),
            black_evals: AtomicU64::new(0f64.to_bits()),
            net_eval: AtomicU32::new(0f32.to_bits()),
            status: AtomicU8::new(STATUS_ACTIVE),
            expand_state: AtomicU8::new(EXPAND_INITIAL),
            min_prior_ratio: AtomicU32::new(UNEXPANDED_RATIO.to_bits()),
            children: UnsafeCell::new(Vec::new()),
        }
    }

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn policy(&self) -> f32 {
        self.policy
    }

    pub fn set_policy(&mut self, policy: f32) {
        self.policy = policy;
    }

    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    pub fn first_visit(&self) -> bool {
        self.visits() == 0
    }

    pub fn virtual_loss(&self) -> i32 {
        self.virtual_loss.load(Ordering::Relaxed)
    }

    pub fn virtual_loss_add(&self) {
        self.virtual_loss
            .fetch_add(VIRTUAL_LOSS_COUNT, Ordering::Relaxed);
    }

    pub fn virtual_loss_undo(&self) {
        self.virtual_loss
            .fetch_sub(VIRTUAL_LOSS_COUNT, Ordering::Relaxed);
    }

    /// Record one completed simulation through this node. The value is the
    /// leaf value from Black's point of view; no per-ply negation.
    pub fn update(&self, black_value: f32) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        add_f64(&self.black_evals, black_value as f64);
    }

    pub fn black_evals(&self) -> f64 {
        f64::from_bits(self.black_evals.load(Ordering::Relaxed))
    }

    fn set_net_eval(&self, black_value: f32) {
        self.net_eval.store(black_value.to_bits(), Ordering::Relaxed);
    }

    /// The evaluator's value for this position, from `color`'s perspective.
    pub fn net_eval(&self, color: Color) -> f32 {
        let v = f32::from_bits(self.net_eval.load(Ordering::Relaxed));
        if color.is_white() {
            1.0 - v
        } else {
            v
        }
    }

    /// Mean value with `pending_virtual_loss` in-flight traversals counted
    /// as losses for Black.
    pub fn raw_eval(&self, color: Color, pending_virtual_loss: i32) -> f32 {
        let visits = self.visits() as i64 + pending_virtual_loss as i64;
        debug_assert!(visits > 0);
        let mut black = self.black_evals();
        if color.is_white() {
            black += pending_virtual_loss as f64;
        }
        let mut eval = (black / visits as f64) as f32;
        if color.is_white() {
            eval = 1.0 - eval;
        }
        eval
    }

    /// Virtual-loss-adjusted mean value. Caches the loss count so a single
    /// consistent adjustment is applied even while counters move underneath.
    pub fn eval(&self, color: Color) -> f32 {
        self.raw_eval(color, self.virtual_loss())
    }

    pub fn valid(&self) -> bool {
        self.status.load(Ordering::Relaxed) != STATUS_INVALID
    }

    pub fn active(&self) -> bool {
        self.status.load(Ordering::Relaxed) == STATUS_ACTIVE
    }

    /// Mark as a superko violation. Irreversible; the child is never
    /// selected again.
    pub fn invalidate(&self) {
        self.status.store(STATUS_INVALID, Ordering::Relaxed);
    }

    pub fn set_active(&self, active: bool) {
        if self.valid() {
            let status = if active { STATUS_ACTIVE } else { STATUS_PRUNED };
            self.status.store(status, Ordering::Relaxed);
        }
    }

    fn min_prior_ratio_value(&self) -> f32 {
        f32::from_bits(self.min_prior_ratio.load(Ordering::Relaxed))
    }

    /// Whether expanding at `min_prior_ratio` would materialize anything new.
    pub fn expandable(&self, min_prior_ratio: f32) -> bool {
        min_prior_ratio < self.min_prior_ratio_value()
    }

    pub fn has_children(&self) -> bool {
        self.min_prior_ratio_value() <= 1.0
    }

    pub fn is_expanding(&self) -> bool {
        self.expand_state.load(Ordering::Acquire) == EXPAND_EXPANDING
    }

    pub fn is_expanded(&self) -> bool {
        self.expand_state.load(Ordering::Acquire) == EXPAND_EXPANDED
    }

    // INITIAL -> EXPANDING. False if the lock was not free.
    fn acquire_expanding(&self) -> bool {
        self.expand_state
            .compare_exchange(
                EXPAND_INITIAL,
                EXPAND_EXPANDING,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    // EXPANDING -> EXPANDED. Publishes `children`.
    fn expand_done(&self) {
        let prev = self.expand_state.swap(EXPAND_EXPANDED, Ordering::Release);
        debug_assert_eq!(prev, EXPAND_EXPANDING);
    }

    // EXPANDING -> INITIAL. The expansion made no progress.
    fn expand_cancel(&self) {
        let prev = self.expand_state.swap(EXPAND_INITIAL, Ordering::Release);
        debug_assert_eq!(prev, EXPAND_EXPANDING);
    }

    /// Spin until no expansion is in flight. True when the children vector
    /// is published and safe to read.
    fn wait_expanded(&self) -> bool {
        while self.expand_state.load(Ordering::Acquire) == EXPAND_EXPANDING {
            std::hint::spin_loop();
        }
        self.expand_state.load(Ordering::Acquire) == EXPAND_EXPANDED
    }

    /// Read access to the published children.
    ///
    /// Callers must have observed EXPANDED (via `wait_expanded`) or hold
    /// `&mut self` further up the path.
    fn published_children(&self) -> &[ChildSlot] {
        unsafe { &*self.children.get() }
    }

    /// Children for exclusive phases (root preparation, re-rooting,
    /// reporting after searchers have joined).
    pub fn children_mut(&mut self) -> &mut Vec<ChildSlot> {
        self.children.get_mut()
    }

    /// Shared view of the children once quiescent or known-expanded.
    pub fn children(&self) -> &[ChildSlot] {
        debug_assert!(!self.is_expanding());
        self.published_children()
    }

    /// Materialize this node's children from the evaluator's policy.
    ///
    /// Returns the position's value (Black's POV) on success, which the
    /// caller backs up as the leaf value of the simulation.
    pub fn expand<G: GameState, E: Evaluator<G>>(
        &self,
        evaluator: &E,
        state: &G,
        min_prior_ratio: f32,
        counter: &NodeCounter,
    ) -> Result<Expansion, ExpandError> {
        // No successors in a final position.
        if state.is_over() {
            return Ok(Expansion::Terminal);
        }
        if !self.acquire_expanding() {
            return Ok(Expansion::NotExpanded);
        }
        // The requested widening may have been satisfied while we raced for
        // the lock.
        if !self.expandable(min_prior_ratio) {
            self.expand_cancel();
            return Ok(Expansion::NotExpanded);
        }

        let raw = match evaluator.evaluate(state, Symmetry::Random) {
            Ok(out) => out,
            Err(e) => {
                self.expand_cancel();
                return Err(ExpandError::Evaluator(e));
            }
        };

        let to_move = state.to_move();
        // The network reports winrate for the side to move; store Black's.
        let mut value = raw.winrate;
        if to_move.is_white() {
            value = 1.0 - value;
        }
        self.set_net_eval(value);

        let size = state.size();
        let mut nodelist: Vec<(f32, Vertex)> = Vec::with_capacity(state.num_intersections() + 1);
        let mut legal_sum = 0.0f32;
        for (i, &p) in raw.policy.iter().enumerate().take(state.num_intersections()) {
            let vertex = state.vertex(i % size, i / size);
            if state.is_legal(to_move, vertex) {
                nodelist.push((p, vertex));
                legal_sum += p;
            }
        }
        nodelist.push((raw.pass, Vertex::PASS));
        legal_sum += raw.pass;

        if legal_sum > f32::MIN_POSITIVE {
            // Re-normalize after removing illegal moves.
            for entry in &mut nodelist {
                entry.0 /= legal_sum;
            }
        } else {
            // Happens with freshly randomized nets.
            let uniform = 1.0 / nodelist.len() as f32;
            for entry in &mut nodelist {
                entry.0 = uniform;
            }
        }

        match self.link_children(counter, nodelist, min_prior_ratio) {
            Ok(()) => {
                self.expand_done();
                Ok(Expansion::Expanded(value))
            }
            Err(e) => {
                self.expand_cancel();
                Err(e)
            }
        }
    }

    fn link_children(
        &self,
        counter: &NodeCounter,
        mut nodelist: Vec<(f32, Vertex)>,
        min_prior_ratio: f32,
    ) -> Result<(), ExpandError> {
        debug_assert!(min_prior_ratio < self.min_prior_ratio_value());
        if nodelist.is_empty() {
            return Ok(());
        }

        // Best to worst; stable so equal priors keep enumeration order.
        nodelist.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let max_prior = nodelist[0].0;
        let old_min = max_prior * self.min_prior_ratio_value();
        let new_min = max_prior * min_prior_ratio;

        let to_add = nodelist
            .iter()
            .filter(|(p, _)| *p >= new_min && *p < old_min)
            .count();
        if !counter.try_grow(to_add) {
            return Err(ExpandError::TreeFull);
        }

        // Sole writer: we hold the EXPANDING lock.
        let children = unsafe { &mut *self.children.get() };
        children.reserve(to_add);
        let mut skipped = false;
        for (prior, vertex) in nodelist {
            if prior < new_min {
                skipped = true;
            } else if prior < old_min {
                children.push(ChildSlot::new(vertex, prior));
            }
        }

        let stored = if skipped { min_prior_ratio } else { 0.0 };
        self.min_prior_ratio.store(stored.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Pick the child maximizing Q + U. Spin-waits while another searcher is
    /// expanding this node; `None` when no active child can be selected.
    pub fn select_child(
        &self,
        color: Color,
        is_root: bool,
        cfg: &SearchConfig,
    ) -> Option<&ChildSlot> {
        if !self.wait_expanded() {
            return None;
        }
        let children = self.published_children();

        // Sum child visits rather than trusting our own counter, so
        // transpositions and re-rooted subtrees stay consistent.
        let mut parent_visits = 0u64;
        let mut total_visited_policy = 0.0f32;
        for child in children {
            if child.valid() {
                let v = child.visits();
                parent_visits += v as u64;
                if v > 0 {
                    total_visited_policy += child.policy();
                }
            }
        }

        let numerator = (parent_visits as f64).sqrt();
        let base_reduction = if is_root {
            cfg.fpu_root_reduction
        } else {
            cfg.fpu_reduction
        };
        let fpu_reduction = base_reduction * total_visited_policy.sqrt();
        // First-play urgency: the parent's own network value, reduced.
        let fpu_eval = self.net_eval(color) - fpu_reduction;

        let mut best: Option<&ChildSlot> = None;
        let mut best_value = f64::MIN;
        for child in children {
            if !child.active() {
                continue;
            }
            let winrate = if child.is_expanding() {
                // Never wait on someone else's expansion if there is any
                // alternative.
                -1.0 - fpu_reduction
            } else if child.visits() > 0 {
                child.eval(color)
            } else {
                fpu_eval
            };
            let psa = child.policy();
            let denom = 1.0 + child.visits() as f64;
            let puct = cfg.c_puct as f64 * psa as f64 * (numerator / denom);
            let value = winrate as f64 + puct;

            if value > best_value {
                best_value = value;
                best = Some(child);
            }
        }
        best
    }

    /// Order children best-first for reporting and move selection: by
    /// visits, by prior among unvisited, by eval among equal visit counts.
    pub fn sort_children(&mut self, color: Color) {
        self.children_mut().sort_by(|a, b| {
            let (va, vb) = (a.visits(), b.visits());
            if va != vb {
                return vb.cmp(&va);
            }
            if va == 0 {
                return b
                    .policy()
                    .partial_cmp(&a.policy())
                    .unwrap_or(std::cmp::Ordering::Equal);
            }
            b.eval(color)
                .partial_cmp(&a.eval(color))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn inflate_all_children(&mut self) {
        for child in self.children_mut() {
            child.inflate();
        }
    }

    /// Recount materialized slots in this subtree and allow still-widenable
    /// nodes to expand again in later searches.
    pub fn count_nodes_and_clear_expand_state(&mut self) -> usize {
        let mut count = self.children.get_mut().len();
        if self.expandable(0.0) {
            self.expand_state.store(EXPAND_INITIAL, Ordering::Relaxed);
        }
        for child in self.children.get_mut() {
            if let Some(node) = child.node_mut() {
                count += node.count_nodes_and_clear_expand_state();
            }
        }
        count
    }
}
