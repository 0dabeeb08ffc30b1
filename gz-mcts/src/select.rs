//! Strength-controlled move selection over the root statistics.
//!
//! Four regimes, keyed off the top child's winrate:
//! a clear gap or a lost position plays the top move outright; an
//! intermediate winrate prefers the most network-natural move among those
//! close to the top; a winning position deliberately gives back winrate by
//! picking, among sufficiently natural moves in the bands below the top, the
//! candidate with the lowest winrate.
//!
//! Winrate thresholds use the search statistics; prior thresholds use the
//! *static prior* captured at root expansion, before any noise.

use std::fmt::Write as _;

use gz_core::config::SelectionConfig;
use gz_core::Vertex;

/// Thresholds derived from the strength scale.
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub scale: f32,
    pub t_min: f32,
    pub t_max: f32,
    /// Winrate gap that forces the top move.
    pub t_uniq: f32,
    /// Relaxation below the top winrate in the intermediate regime.
    pub t_dif: f32,
    /// Winrate deltas bounding the four bands of the winning regime.
    pub deltas: [f32; 4],
    /// Static-prior floors for the four bands, widest band first.
    pub priors: [f32; 4],
    pub min_visits: u32,
}

impl From<&SelectionConfig> for SelectionParams {
    fn from(cfg: &SelectionConfig) -> Self {
        let c = cfg.scale;
        Self {
            scale: c,
            t_min: 0.40,
            t_max: 0.60,
            t_uniq: 0.08 * c,
            t_dif: 0.03 * c,
            deltas: [0.03 * c, 0.04 * c, 0.06 * c, 0.08 * c],
            priors: [0.05, 0.10, 0.20, 0.40],
            min_visits: cfg.min_visits,
        }
    }
}

/// One visited root child, best-first order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub vertex: Vertex,
    pub text: String,
    pub visits: u32,
    /// Search winrate from the mover's perspective.
    pub winrate: f32,
    /// Pre-noise expansion-time prior.
    pub static_prior: f32,
    /// Fraction of root visits spent on this child.
    pub visit_share: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionCase {
    /// The top move is clearly best.
    Gap,
    /// Losing anyway; play the best we have.
    Losing,
    /// Prefer the network's move among near-equals.
    Intermediate,
    /// Give back winrate on purpose.
    Winning,
}

impl SelectionCase {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionCase::Gap => "gap",
            SelectionCase::Losing => "losing",
            SelectionCase::Intermediate => "intermediate",
            SelectionCase::Winning => "winning",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub vertex: Vertex,
    pub winrate: f32,
    pub case: SelectionCase,
    /// Game-record comment: the case taken plus the candidate table.
    pub explanation: String,
}

/// Pick the move to play. `candidates` must be the visited root children in
/// best-first order; it must not be empty.
pub fn select_move(candidates: &[Candidate], params: &SelectionParams) -> Selection {
    assert!(!candidates.is_empty());

    let w1 = candidates[0].winrate;
    let w2 = candidates.get(1).map(|c| c.winrate).unwrap_or(0.0);

    let (case, index) = if w1 - w2 >= params.t_uniq {
        (SelectionCase::Gap, 0)
    } else if w1 <= params.t_min {
        (SelectionCase::Losing, 0)
    } else if w1 <= params.t_max {
        (SelectionCase::Intermediate, intermediate_pick(candidates, params, w1))
    } else {
        (SelectionCase::Winning, winning_pick(candidates, params, w1))
    };

    let chosen = &candidates[index];
    Selection {
        vertex: chosen.vertex,
        winrate: chosen.winrate,
        case,
        explanation: explanation(candidates, chosen, case),
    }
}

/// Highest static prior among candidates within `t_dif` of the top winrate.
fn intermediate_pick(candidates: &[Candidate], params: &SelectionParams, w1: f32) -> usize {
    let threshold = w1 - params.t_dif;
    let mut best = 0usize;
    let mut best_prior = 0.0f32;
    for (i, c) in candidates.iter().enumerate() {
        if c.visits < params.min_visits || c.winrate < threshold {
            continue;
        }
        if c.static_prior > best_prior {
            best_prior = c.static_prior;
            best = i;
        }
    }
    best
}

/// Lowest winrate among candidates that fall in one of the four bands below
/// the top with enough static prior. Ties keep the earlier candidate.
fn winning_pick(candidates: &[Candidate], params: &SelectionParams, w1: f32) -> usize {
    let [d1, d2, d3, d4] = params.deltas;
    let [p1, p2, p3, p4] = params.priors;

    let mut chosen = 0usize;
    let mut chosen_winrate = candidates[0].winrate;
    for (i, c) in candidates.iter().enumerate() {
        if c.visits < params.min_visits {
            continue;
        }
        let wr = c.winrate;
        let sp = c.static_prior;
        let in_band = (wr >= w1 - d4 && wr <= w1 - d3 && sp >= p4)
            || (wr >= w1 - d3 && wr <= w1 - d2 && sp >= p3)
            || (wr >= w1 - d2 && wr <= w1 - d1 && sp >= p2)
            || (wr >= w1 - d1 && sp > p1);
        if in_band && wr < chosen_winrate {
            chosen_winrate = wr;
            chosen = i;
        }
    }
    chosen
}

fn explanation(candidates: &[Candidate], chosen: &Candidate, case: SelectionCase) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({:.3}) by {}",
        chosen.text,
        chosen.winrate,
        case.as_str()
    );
    let _ = writeln!(out, "index\tvertex\twr\tvisits\tshare\tsp");
    for (i, c) in candidates.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}\t{}\t{:.3}\t{}\t{:.3}\t{:.3}",
            i + 1,
            c.text,
            c.winrate,
            c.visits,
            c.visit_share,
            c.static_prior
        );
    }
    out
}
