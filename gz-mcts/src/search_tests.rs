use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::Duration;

use gz_core::config::{NoiseConfig, SearchConfig};
use gz_core::{Color, GameState, LightBoard, Vertex};
use gz_eval::{EvalError, Evaluator, NetOutput, Symmetry, UniformEvaluator};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::node::Node;
use crate::search::{play_simulation, run_searcher, SearchShared};
use crate::time::TimeBudget;
use crate::tree::Tree;

struct RampEvaluator {
    winrate: f32,
}

impl Evaluator<LightBoard> for RampEvaluator {
    fn evaluate(&self, state: &LightBoard, _s: Symmetry) -> Result<NetOutput, EvalError> {
        let n = state.num_intersections();
        Ok(NetOutput {
            policy: (0..n).map(|i| (i + 1) as f32).collect(),
            pass: 0.5,
            winrate: self.winrate,
        })
    }
}

struct TransientEvaluator;

impl Evaluator<LightBoard> for TransientEvaluator {
    fn evaluate(&self, _state: &LightBoard, _s: Symmetry) -> Result<NetOutput, EvalError> {
        Err(EvalError::Transient("queue hiccup".to_string()))
    }
}

struct FatalEvaluator;

impl Evaluator<LightBoard> for FatalEvaluator {
    fn evaluate(&self, _state: &LightBoard, _s: Symmetry) -> Result<NetOutput, EvalError> {
        Err(EvalError::Fatal("weights corrupt".to_string()))
    }
}

/// Uniform evaluator that forces the second and third calls (the first two
/// leaf expansions) to overlap, then fails any later call so the search can
/// only finish with exactly two completed simulations.
struct RendezvousEvaluator {
    calls: AtomicU32,
    barrier: Barrier,
}

impl RendezvousEvaluator {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            barrier: Barrier::new(2),
        }
    }
}

impl Evaluator<LightBoard> for RendezvousEvaluator {
    fn evaluate(&self, state: &LightBoard, _s: Symmetry) -> Result<NetOutput, EvalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match call {
            1 => {}
            2 | 3 => {
                self.barrier.wait();
            }
            _ => return Err(EvalError::Transient("past the rendezvous".to_string())),
        }
        let n = state.num_intersections();
        let p = 1.0 / (n as f32 + 1.0);
        Ok(NetOutput {
            policy: vec![p; n],
            pass: p,
            winrate: 0.5,
        })
    }
}

fn prepared_tree<E: Evaluator<LightBoard>>(board: &LightBoard, evaluator: &E) -> Tree {
    let mut tree = Tree::new(1 << 20);
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    tree.prepare_root(board, evaluator, &NoiseConfig::default(), &mut rng)
        .unwrap();
    tree
}

fn quiescent(node: &mut Node) {
    assert_eq!(node.virtual_loss(), 0, "virtual loss left on {:?}", node.vertex());
    // black_eval_sum stays within [0, visits] everywhere.
    assert!(node.black_evals() >= -1e-6);
    assert!(node.black_evals() <= node.visits() as f64 + 1e-6);
    if node.visits() == 0 {
        assert_eq!(node.black_evals(), 0.0);
    }
    for slot in node.children_mut() {
        if let Some(child) = slot.node_mut() {
            quiescent(child);
        }
    }
}

struct Harness<'a, E> {
    tree: &'a Tree,
    board: &'a LightBoard,
    evaluator: &'a E,
    cfg: SearchConfig,
    running: AtomicBool,
    playouts: AtomicU32,
    failure: Mutex<Option<EvalError>>,
    budget: TimeBudget,
}

impl<'a, E: Evaluator<LightBoard>> Harness<'a, E> {
    fn new(tree: &'a Tree, board: &'a LightBoard, evaluator: &'a E, cfg: SearchConfig) -> Self {
        Self {
            tree,
            board,
            evaluator,
            cfg,
            running: AtomicBool::new(true),
            playouts: AtomicU32::new(0),
            failure: Mutex::new(None),
            budget: TimeBudget::unlimited(),
        }
    }

    fn shared(&self) -> SearchShared<'_, LightBoard, E> {
        SearchShared {
            tree: self.tree,
            root_state: self.board,
            evaluator: self.evaluator,
            cfg: &self.cfg,
            running: &self.running,
            playouts: &self.playouts,
            budget: self.budget,
            failure: &self.failure,
        }
    }
}

#[test]
fn single_thread_visit_limit_one_expands_root_and_visits_top_prior() {
    // Empty 13x13 board, one thread, one visit.
    let board = LightBoard::new(13);
    let evaluator = RampEvaluator { winrate: 0.5 };
    let tree = prepared_tree(&board, &evaluator);

    // All legal moves plus pass.
    assert_eq!(tree.root().children().len(), 170);

    let harness = Harness::new(
        &tree,
        &board,
        &evaluator,
        SearchConfig {
            max_visits: 1,
            ..SearchConfig::default()
        },
    );
    run_searcher(&harness.shared());

    assert_eq!(tree.root().visits(), 1);
    assert_eq!(harness.playouts.load(Ordering::Relaxed), 1);

    // The single simulation went to the top-prior child: every Q collapsed
    // to the same first-play urgency on the first visit.
    let top = board.vertex(12, 12);
    let mut tree = tree;
    let mut visited = Vec::new();
    for slot in tree.root_mut().children_mut() {
        if slot.visits() > 0 {
            visited.push(slot.vertex());
        }
    }
    assert_eq!(visited, vec![top]);
    quiescent(tree.root_mut());
}

#[test]
fn two_threads_visit_limit_two_diversify_through_virtual_loss() {
    let board = LightBoard::new(9);
    let evaluator = RendezvousEvaluator::new();
    let tree = prepared_tree(&board, &evaluator);

    let harness = Harness::new(
        &tree,
        &board,
        &evaluator,
        SearchConfig {
            threads: 2,
            max_visits: 2,
            ..SearchConfig::default()
        },
    );
    let shared = harness.shared();
    thread::scope(|s| {
        s.spawn(|| run_searcher(&shared));
        s.spawn(|| run_searcher(&shared));
    });

    assert_eq!(tree.root().visits(), 2);
    assert_eq!(harness.playouts.load(Ordering::Relaxed), 2);

    // Virtual loss pushed the concurrent simulations to two distinct
    // children; both in-flight adjustments were undone.
    let mut tree = tree;
    let mut once_visited = 0;
    for slot in tree.root_mut().children_mut() {
        match slot.visits() {
            0 => {}
            1 => once_visited += 1,
            v => panic!("child {} visited {v} times", slot.vertex()),
        }
    }
    assert_eq!(once_visited, 2);
    quiescent(tree.root_mut());
}

#[test]
fn failed_expansions_count_no_playouts_and_restore_virtual_loss() {
    let board = LightBoard::new(5);
    let good = UniformEvaluator;
    let tree = prepared_tree(&board, &good);

    // Every leaf expansion now fails; simulations abort cleanly.
    let bad = TransientEvaluator;
    let mut harness = Harness::new(&tree, &board, &bad, SearchConfig::default());
    harness.budget = TimeBudget::start(&gz_core::config::TimeConfig {
        max_time_ms: 60,
        lag_buffer_ms: 0,
    });
    run_searcher(&harness.shared());

    assert_eq!(harness.playouts.load(Ordering::Relaxed), 0);
    assert_eq!(tree.root().visits(), 0);
    let mut tree = tree;
    quiescent(tree.root_mut());
}

#[test]
fn fatal_evaluator_error_stops_the_search_and_is_recorded() {
    let board = LightBoard::new(5);
    let good = UniformEvaluator;
    let tree = prepared_tree(&board, &good);

    let bad = FatalEvaluator;
    let harness = Harness::new(&tree, &board, &bad, SearchConfig::default());
    run_searcher(&harness.shared());

    assert!(!harness.running.load(Ordering::Relaxed));
    let failure = harness.failure.lock().unwrap();
    assert!(matches!(*failure, Some(EvalError::Fatal(_))));
}

#[test]
fn terminal_positions_are_scored_not_evaluated() {
    // One pass already played: choosing pass ends the game, and the
    // capture-free score (0 stones minus komi) is a White win.
    let mut board = LightBoard::new(5);
    board.play(Color::White, Vertex::PASS);
    assert_eq!(board.to_move(), Color::Black);

    // Make pass overwhelmingly attractive so every simulation takes it.
    struct PassLover;
    impl Evaluator<LightBoard> for PassLover {
        fn evaluate(&self, state: &LightBoard, _s: Symmetry) -> Result<NetOutput, EvalError> {
            Ok(NetOutput {
                policy: vec![1e-6; state.num_intersections()],
                pass: 1.0,
                winrate: 0.5,
            })
        }
    }

    let evaluator = PassLover;
    let tree = prepared_tree(&board, &evaluator);
    let harness = Harness::new(
        &tree,
        &board,
        &evaluator,
        SearchConfig {
            max_visits: 8,
            ..SearchConfig::default()
        },
    );
    run_searcher(&harness.shared());

    let mut tree = tree;
    let root = tree.root_mut();
    let pass = root
        .children_mut()
        .iter()
        .find(|s| s.vertex() == Vertex::PASS)
        .unwrap();
    assert!(pass.visits() > 0);
    // Every pass simulation scored the finished game as a Black loss.
    assert!((pass.eval(Color::Black) - 0.0).abs() < 1e-6);
    assert!((pass.eval(Color::White) - 1.0).abs() < 1e-6);
    quiescent(tree.root_mut());
}

#[test]
fn selection_avoids_a_child_someone_else_is_expanding() {
    let board = LightBoard::new(5);
    let evaluator = UniformEvaluator;
    let tree = prepared_tree(&board, &evaluator);

    let root = tree.root();
    let cfg = SearchConfig::default();
    let first = root.select_child(Color::Black, false, &cfg).unwrap();
    let first_vertex = first.vertex();
    let child = first.inflate();

    let mut child_state = board.clone();
    child_state.play(Color::Black, first_vertex);

    // Hold the child's expansion lock open from another thread.
    struct Parked {
        entered: Barrier,
        release: Barrier,
    }
    impl Evaluator<LightBoard> for Parked {
        fn evaluate(&self, state: &LightBoard, _s: Symmetry) -> Result<NetOutput, EvalError> {
            self.entered.wait();
            self.release.wait();
            let n = state.num_intersections();
            let p = 1.0 / (n as f32 + 1.0);
            Ok(NetOutput {
                policy: vec![p; n],
                pass: p,
                winrate: 0.5,
            })
        }
    }
    let parked = Parked {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    };

    thread::scope(|s| {
        let handle = s.spawn(|| {
            child
                .expand(&parked, &child_state, 0.0, tree.counter())
                .unwrap()
        });

        parked.entered.wait();
        assert!(child.is_expanding());
        // With the top child mid-expansion it is ranked below every
        // alternative instead of blocking us.
        let picked = root.select_child(Color::Black, false, &cfg).unwrap();
        assert_ne!(picked.vertex(), first_vertex);

        parked.release.wait();
        handle.join().unwrap();
    });
    assert!(child.is_expanded());
}

#[test]
fn single_threaded_search_is_reproducible() {
    let run = || {
        let board = LightBoard::new(7);
        let evaluator = RampEvaluator { winrate: 0.55 };
        let tree = prepared_tree(&board, &evaluator);
        let harness = Harness::new(
            &tree,
            &board,
            &evaluator,
            SearchConfig {
                max_visits: 32,
                ..SearchConfig::default()
            },
        );
        run_searcher(&harness.shared());

        let mut tree = tree;
        let mut stats: Vec<(Vertex, u32, f64)> = Vec::new();
        for slot in tree.root_mut().children_mut() {
            let vertex = slot.vertex();
            if let Some(n) = slot.node_mut() {
                stats.push((vertex, n.visits(), n.black_evals()));
            }
        }
        (tree.root().visits(), stats)
    };

    assert_eq!(run(), run());
}

#[test]
fn play_simulation_backs_up_black_relative_values() {
    let board = LightBoard::new(5);
    let evaluator = RampEvaluator { winrate: 0.8 };
    let tree = prepared_tree(&board, &evaluator);
    let harness = Harness::new(&tree, &board, &evaluator, SearchConfig::default());
    let shared = harness.shared();

    let mut state = board.clone();
    let value = play_simulation(&mut state, tree.root(), &shared, true)
        .unwrap()
        .unwrap();

    // The leaf was a White-to-move position; 0.8 for White is 0.2 for
    // Black, and the same number lands on every node of the path.
    assert!((value - 0.2).abs() < 1e-6);
    assert!((tree.root().black_evals() - 0.2).abs() < 1e-6);
    let visited = tree
        .root()
        .children()
        .iter()
        .find(|s| s.visits() > 0)
        .unwrap();
    assert!((visited.node().unwrap().black_evals() - 0.2).abs() < 1e-6);
}

#[test]
fn time_budget_stops_an_unbounded_search() {
    let board = LightBoard::new(5);
    let evaluator = UniformEvaluator;
    let tree = prepared_tree(&board, &evaluator);
    let mut harness = Harness::new(&tree, &board, &evaluator, SearchConfig::default());
    harness.budget = TimeBudget::start(&gz_core::config::TimeConfig {
        max_time_ms: 60,
        lag_buffer_ms: 0,
    });

    let started = std::time::Instant::now();
    run_searcher(&harness.shared());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(tree.root().visits() > 0);
}
