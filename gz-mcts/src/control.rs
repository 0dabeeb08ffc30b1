//! The controller: owns the tree and the game position, runs the searcher
//! pool, applies the move-selection policy, and advances the root.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use gz_core::config::{split_memory, Config, MemorySplit, SearchConfig};
use gz_core::{Color, GameState, Vertex};
use gz_eval::Evaluator;
use gz_logging::{now_ms, NdjsonWriter, ThinkEventV1};

use crate::search::{run_searcher, SearchShared};
use crate::select::{select_move, Candidate, Selection, SelectionCase, SelectionParams};
use crate::time::TimeBudget;
use crate::tree::Tree;
use crate::SearchError;

/// Interrupts a running `think` or `ponder` from another thread.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

pub struct Controller<G, E> {
    cfg: Config,
    state: G,
    tree: Tree,
    evaluator: E,
    running: Arc<AtomicBool>,
    rng: ChaCha8Rng,
    log: Option<NdjsonWriter>,
}

impl<G: GameState, E: Evaluator<G>> Controller<G, E> {
    pub fn new(state: G, evaluator: E, cfg: Config) -> Result<Self, SearchError> {
        let split = cfg.memory.split(state.num_intersections())?;
        let rng = ChaCha8Rng::seed_from_u64(cfg.noise.seed);
        Ok(Self {
            cfg,
            state,
            tree: Tree::new(split.max_tree_nodes),
            evaluator,
            running: Arc::new(AtomicBool::new(false)),
            rng,
            log: None,
        })
    }

    pub fn state(&self) -> &G {
        &self.state
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Route one `think` event per completed search into `writer`.
    pub fn attach_log(&mut self, writer: NdjsonWriter) {
        self.log = Some(writer);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Root visit limit for the next searches. 0 means unlimited.
    pub fn set_visit_limit(&mut self, visits: u32) {
        self.cfg.search.max_visits = visits;
    }

    /// Playout limit for the next searches. 0 means unlimited.
    pub fn set_playout_limit(&mut self, playouts: u32) {
        self.cfg.search.max_playouts = playouts;
    }

    /// Re-split the memory budget. The tree bound applies immediately; the
    /// returned split carries the cache capacity for the embedder to apply
    /// to its evaluator cache.
    pub fn set_max_memory(
        &mut self,
        max_bytes: usize,
        cache_ratio_percent: u8,
    ) -> Result<MemorySplit, SearchError> {
        let split = split_memory(
            max_bytes,
            cache_ratio_percent,
            self.state.num_intersections(),
        )?;
        self.cfg.memory.max_bytes = max_bytes;
        self.cfg.memory.cache_ratio_percent = cache_ratio_percent;
        self.tree.set_max_nodes(split.max_tree_nodes);
        Ok(split)
    }

    pub fn clear_tree(&mut self) {
        self.tree.clear();
    }

    /// Search the current position for `color` and play the selected move.
    /// The chosen child becomes the new root; discarded siblings are
    /// released.
    pub fn think(&mut self, color: Color) -> Result<(Vertex, String), SearchError> {
        if self.state.is_over() {
            return Err(SearchError::GameOver);
        }
        if self.state.to_move() != color {
            return Err(SearchError::OutOfTurn(color));
        }

        let budget = TimeBudget::start(&self.cfg.time);
        self.tree
            .prepare_root(&self.state, &self.evaluator, &self.cfg.noise, &mut self.rng)?;

        let playouts = AtomicU32::new(0);
        let search_cfg = self.cfg.search.clone();
        self.run_workers(&search_cfg, budget, &playouts)?;

        let selection = self.select_root_move(color)?;
        let playouts = playouts.load(Ordering::Relaxed);
        self.log_think(color, &selection, playouts, budget);

        self.tree.advance_root(selection.vertex);
        self.state.play(color, selection.vertex);
        Ok((selection.vertex, selection.explanation))
    }

    /// Search on the opponent's time. Runs with no visit or playout budget
    /// until `stop()` (or a `StopHandle`) interrupts it.
    pub fn ponder(&mut self) -> Result<(), SearchError> {
        if self.state.is_over() {
            return Ok(());
        }
        self.tree
            .prepare_root(&self.state, &self.evaluator, &self.cfg.noise, &mut self.rng)?;

        let ponder_cfg = SearchConfig {
            max_visits: 0,
            max_playouts: 0,
            ..self.cfg.search.clone()
        };
        let playouts = AtomicU32::new(0);
        self.run_workers(&ponder_cfg, TimeBudget::unlimited(), &playouts)
    }

    /// A move was played outside the search (the opponent's, usually).
    /// Re-roots to that move, preserving its subtree when it exists.
    pub fn notify_move_played(&mut self, color: Color, vertex: Vertex) -> Result<(), SearchError> {
        if self.state.to_move() != color {
            return Err(SearchError::OutOfTurn(color));
        }
        self.tree.advance_root(vertex);
        self.state.play(color, vertex);
        Ok(())
    }

    fn run_workers(
        &self,
        cfg: &SearchConfig,
        budget: TimeBudget,
        playouts: &AtomicU32,
    ) -> Result<(), SearchError> {
        self.running.store(true, Ordering::Relaxed);
        let failure = Mutex::new(None);
        let shared = SearchShared {
            tree: &self.tree,
            root_state: &self.state,
            evaluator: &self.evaluator,
            cfg,
            running: &self.running,
            playouts,
            budget,
            failure: &failure,
        };

        thread::scope(|s| {
            for _ in 0..cfg.resolved_threads() {
                s.spawn(|| run_searcher(&shared));
            }
        });
        self.running.store(false, Ordering::Relaxed);

        match failure.into_inner().unwrap() {
            Some(e) => Err(SearchError::Evaluator(e)),
            None => Ok(()),
        }
    }

    fn select_root_move(&mut self, color: Color) -> Result<Selection, SearchError> {
        let root = self.tree.root_mut();
        root.sort_children(color);
        let root_visits = root.visits().max(1);

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut fallback: Option<Vertex> = None;
        for slot in root.children_mut().iter() {
            if !slot.valid() {
                continue;
            }
            if fallback.is_none() {
                fallback = Some(slot.vertex());
            }
            let visits = slot.visits();
            if visits == 0 {
                continue;
            }
            candidates.push(Candidate {
                vertex: slot.vertex(),
                text: String::new(),
                visits,
                winrate: slot.eval(color),
                static_prior: slot.static_prior(),
                visit_share: visits as f32 / root_visits as f32,
            });
        }
        for c in &mut candidates {
            c.text = self.state.move_text(c.vertex);
        }

        if candidates.is_empty() {
            // No completed simulation reached a child; children are sorted
            // by prior, so the first valid one is the network's move.
            let vertex = fallback.ok_or(SearchError::GameOver)?;
            let root = self.tree.root();
            return Ok(Selection {
                vertex,
                winrate: root.net_eval(color),
                case: SelectionCase::Gap,
                explanation: format!(
                    "{} ({:.3}) without playouts\n",
                    self.state.move_text(vertex),
                    root.net_eval(color)
                ),
            });
        }

        Ok(select_move(
            &candidates,
            &SelectionParams::from(&self.cfg.selection),
        ))
    }

    fn log_think(&mut self, color: Color, selection: &Selection, playouts: u32, budget: TimeBudget) {
        let root_visits = self.tree.root().visits();
        let tree_nodes = self.tree.node_count();
        let chosen = self.state.move_text(selection.vertex);
        if let Some(log) = &mut self.log {
            let _ = log.write_event(&ThinkEventV1 {
                event: "think",
                ts_ms: now_ms(),
                color: if color.is_white() { 'w' } else { 'b' },
                chosen,
                winrate: selection.winrate,
                case: selection.case.as_str(),
                root_visits,
                playouts,
                tree_nodes,
                elapsed_ms: budget.elapsed().as_millis() as u64,
            });
            let _ = log.flush();
        }
    }
}
