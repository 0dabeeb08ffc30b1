//! A capture-free board for exercising the search.
//!
//! `LightBoard` implements the full `GameState` surface without being a Go
//! rules engine: every empty intersection is legal, nothing is ever captured,
//! and the score is the stone difference minus komi. Tests and benches drive
//! the search core with it; the real engine plugs in its own rules.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::game::{Color, GameState};
use crate::vertex::Vertex;

#[derive(Debug, Clone)]
pub struct LightBoard {
    size: usize,
    stones: Vec<Option<Color>>,
    to_move: Color,
    passes: u32,
    komi: f32,
    /// Vertices that repeat an earlier position once played. Lets tests
    /// stand in for the rules engine's superko detection.
    superko_after: Vec<Vertex>,
    last_move: Vertex,
}

impl LightBoard {
    pub fn new(size: usize) -> Self {
        Self::with_komi(size, 7.5)
    }

    pub fn with_komi(size: usize, komi: f32) -> Self {
        assert!(size >= 2, "board too small");
        Self {
            size,
            stones: vec![None; size * size],
            to_move: Color::Black,
            passes: 0,
            komi,
            superko_after: Vec::new(),
            last_move: Vertex::NONE,
        }
    }

    /// Declare that playing `vertex` reproduces an earlier position.
    pub fn mark_superko(&mut self, vertex: Vertex) {
        self.superko_after.push(vertex);
    }

    pub fn last_move(&self) -> Vertex {
        self.last_move
    }

    fn index(&self, vertex: Vertex) -> Option<usize> {
        if vertex.is_sentinel() {
            return None;
        }
        let i = vertex.0 as usize;
        (i < self.stones.len()).then_some(i)
    }

    fn coords(&self, vertex: Vertex) -> Option<(usize, usize)> {
        self.index(vertex).map(|i| (i % self.size, i / self.size))
    }
}

impl GameState for LightBoard {
    fn size(&self) -> usize {
        self.size
    }

    fn to_move(&self) -> Color {
        self.to_move
    }

    fn is_legal(&self, _color: Color, vertex: Vertex) -> bool {
        if vertex == Vertex::PASS {
            return true;
        }
        match self.index(vertex) {
            Some(i) => self.stones[i].is_none(),
            None => false,
        }
    }

    fn play(&mut self, color: Color, vertex: Vertex) {
        if vertex == Vertex::PASS {
            self.passes += 1;
        } else if let Some(i) = self.index(vertex) {
            debug_assert!(self.stones[i].is_none(), "occupied vertex");
            self.stones[i] = Some(color);
            self.passes = 0;
        }
        self.last_move = vertex;
        self.to_move = color.opponent();
    }

    fn pass_count(&self) -> u32 {
        self.passes
    }

    fn final_score(&self) -> f32 {
        let mut black = 0i32;
        let mut white = 0i32;
        for s in &self.stones {
            match s {
                Some(Color::Black) => black += 1,
                Some(Color::White) => white += 1,
                None => {}
            }
        }
        (black - white) as f32 - self.komi
    }

    fn vertex(&self, x: usize, y: usize) -> Vertex {
        debug_assert!(x < self.size && y < self.size);
        Vertex((y * self.size + x) as i32)
    }

    fn hash(&self) -> u64 {
        let mut h = FxHasher::default();
        for (i, s) in self.stones.iter().enumerate() {
            match s {
                Some(Color::Black) => (i as u64, 1u8).hash(&mut h),
                Some(Color::White) => (i as u64, 2u8).hash(&mut h),
                None => {}
            }
        }
        self.to_move.is_white().hash(&mut h);
        self.passes.hash(&mut h);
        h.finish()
    }

    fn is_superko(&self) -> bool {
        self.superko_after.contains(&self.last_move)
    }

    fn move_text(&self, vertex: Vertex) -> String {
        match self.coords(vertex) {
            Some((x, y)) => {
                // Skip 'I', as board coordinates conventionally do.
                let col = if x < 8 {
                    (b'A' + x as u8) as char
                } else {
                    (b'A' + x as u8 + 1) as char
                };
                format!("{}{}", col, y + 1)
            }
            None => vertex.to_string(),
        }
    }
}
