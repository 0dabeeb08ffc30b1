use gz_core::config::SelectionConfig;
use gz_core::Vertex;

use crate::select::{select_move, Candidate, SelectionCase, SelectionParams};

fn params() -> SelectionParams {
    SelectionParams::from(&SelectionConfig::default())
}

fn cand(v: i32, winrate: f32, static_prior: f32, visits: u32) -> Candidate {
    Candidate {
        vertex: Vertex(v),
        text: format!("v{v}"),
        visits,
        winrate,
        static_prior,
        visit_share: 0.1,
    }
}

#[test]
fn thresholds_derive_from_the_scale() {
    let p = params();
    assert!((p.t_uniq - 0.064).abs() < 1e-6);
    assert!((p.t_dif - 0.024).abs() < 1e-6);
    assert!((p.deltas[0] - 0.024).abs() < 1e-6);
    assert!((p.deltas[1] - 0.032).abs() < 1e-6);
    assert!((p.deltas[2] - 0.048).abs() < 1e-6);
    assert!((p.deltas[3] - 0.064).abs() < 1e-6);
    assert_eq!(p.priors, [0.05, 0.10, 0.20, 0.40]);
}

#[test]
fn clear_gap_plays_the_top_move() {
    // W1 - W2 = 0.15 >= 0.064.
    let cands = vec![cand(1, 0.95, 0.3, 100), cand(2, 0.80, 0.4, 80)];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Gap);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn losing_position_plays_the_top_move() {
    // W1 = 0.30 <= 0.40 and the gap is small.
    let cands = vec![cand(1, 0.30, 0.1, 100), cand(2, 0.28, 0.5, 90)];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Losing);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn intermediate_band_prefers_the_highest_static_prior() {
    // W1 = 0.50; candidates within 0.024 with >= 10 visits compete on
    // static prior: 0.48/0.22 beats 0.49/0.10 and the top's 0.05.
    let cands = vec![
        cand(1, 0.50, 0.05, 100),
        cand(2, 0.49, 0.10, 40),
        cand(3, 0.48, 0.22, 30),
    ];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Intermediate);
    assert_eq!(s.vertex, Vertex(3));
    assert!((s.winrate - 0.48).abs() < 1e-6);
}

#[test]
fn intermediate_band_ignores_barely_visited_children() {
    let cands = vec![
        cand(1, 0.50, 0.05, 100),
        // Highest prior but too few visits to trust.
        cand(2, 0.49, 0.40, 5),
    ];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Intermediate);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn intermediate_band_falls_back_to_the_top_move() {
    // Nothing inside the relaxation window.
    let cands = vec![cand(1, 0.50, 0.01, 100), cand(2, 0.45, 0.50, 50)];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Intermediate);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn winning_position_picks_the_lowest_qualifying_winrate() {
    // W1 = 0.82; deltas 0.024/0.032/0.048/0.064.
    // (0.80, 0.45) qualifies in the first band (prior > 0.05);
    // (0.78, 0.30) qualifies in [W1-0.048, W1-0.032] with prior >= 0.20.
    // The lower winrate wins: maximal strength reduction.
    let cands = vec![
        cand(1, 0.82, 0.02, 200),
        cand(2, 0.80, 0.45, 100),
        cand(3, 0.78, 0.30, 60),
    ];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Winning);
    assert_eq!(s.vertex, Vertex(3));
    assert!((s.winrate - 0.78).abs() < 1e-6);
}

#[test]
fn winning_position_requires_enough_static_prior_per_band() {
    // Same winrates as above, but priors below each band's floor.
    let cands = vec![
        cand(1, 0.82, 0.02, 200),
        cand(2, 0.80, 0.04, 100),
        cand(3, 0.78, 0.15, 60),
    ];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Winning);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn winning_position_ignores_moves_below_all_bands() {
    // 0.70 sits below W1 - D4 = 0.756: too much winrate to give away.
    let cands = vec![
        cand(1, 0.82, 0.02, 200),
        cand(2, 0.79, 0.01, 150),
        cand(3, 0.70, 0.60, 100),
    ];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Winning);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn winning_ties_keep_the_earlier_candidate() {
    let cands = vec![
        cand(1, 0.82, 0.02, 200),
        cand(2, 0.80, 0.45, 100),
        cand(3, 0.80, 0.45, 90),
    ];
    let s = select_move(&cands, &params());
    assert_eq!(s.vertex, Vertex(2));
}

#[test]
fn single_candidate_is_a_gap() {
    let cands = vec![cand(1, 0.5, 0.3, 1)];
    let s = select_move(&cands, &params());
    assert_eq!(s.case, SelectionCase::Gap);
    assert_eq!(s.vertex, Vertex(1));
}

#[test]
fn explanation_names_the_case_and_lists_candidates() {
    let cands = vec![cand(1, 0.95, 0.3, 100), cand(2, 0.80, 0.4, 80)];
    let s = select_move(&cands, &params());
    assert!(s.explanation.contains("by gap"));
    assert!(s.explanation.contains("v1"));
    assert!(s.explanation.contains("v2"));
    // One header, one summary, one row per candidate.
    assert_eq!(s.explanation.lines().count(), 2 + cands.len());
}
