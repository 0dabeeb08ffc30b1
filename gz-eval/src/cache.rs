//! Bounded LRU cache for network evaluations.
//!
//! Keyed by the position hash. A hit bypasses the evaluator entirely; the
//! search cannot otherwise observe the cache. Stale recency records are
//! dropped lazily during eviction, keeping both lookup and insert O(1)
//! amortized without a linked list.

use std::collections::VecDeque;
use std::sync::Mutex;

use gz_core::GameState;
use rustc_hash::FxHashMap;

use crate::evaluator::{EvalError, Evaluator, NetOutput, Symmetry};

struct Entry {
    output: NetOutput,
    stamp: u64,
}

pub struct EvalCache {
    map: FxHashMap<u64, Entry>,
    recency: VecDeque<(u64, u64)>,
    capacity: usize,
    clock: u64,
    hits: u64,
    lookups: u64,
}

impl EvalCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::default(),
            recency: VecDeque::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            lookups: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// (hits, lookups) since creation or the last resize.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.lookups)
    }

    pub fn get(&mut self, key: u64) -> Option<NetOutput> {
        self.lookups += 1;
        self.clock += 1;
        let stamp = self.clock;
        let entry = self.map.get_mut(&key)?;
        entry.stamp = stamp;
        self.recency.push_back((key, stamp));
        self.hits += 1;
        Some(entry.output.clone())
    }

    pub fn insert(&mut self, key: u64, output: NetOutput) {
        self.clock += 1;
        let stamp = self.clock;
        self.map.insert(key, Entry { output, stamp });
        self.recency.push_back((key, stamp));
        self.evict();
    }

    /// Change capacity, evicting least-recently-used entries as needed.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.recency.clear();
        self.hits = 0;
        self.lookups = 0;
    }

    fn evict(&mut self) {
        while self.map.len() > self.capacity {
            match self.recency.pop_front() {
                Some((key, stamp)) => {
                    // A newer record for the same key supersedes this one.
                    let current = self.map.get(&key).map(|e| e.stamp);
                    if current == Some(stamp) {
                        self.map.remove(&key);
                    }
                }
                None => break,
            }
        }
        // Bound the recency queue so stale records cannot accumulate.
        while self.recency.len() > 4 * self.capacity {
            if let Some((key, stamp)) = self.recency.pop_front() {
                if self.map.get(&key).map(|e| e.stamp) == Some(stamp) {
                    // Still live: re-queue at the back untouched.
                    self.recency.push_back((key, stamp));
                }
            }
        }
    }
}

/// Evaluator decorator that consults the cache first.
pub struct CachedEvaluator<E> {
    inner: E,
    cache: Mutex<EvalCache>,
}

impl<E> CachedEvaluator<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(EvalCache::new(capacity)),
        }
    }

    pub fn resize(&self, capacity: usize) {
        self.cache.lock().unwrap().resize(capacity);
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn stats(&self) -> (u64, u64) {
        self.cache.lock().unwrap().stats()
    }
}

impl<G: GameState, E: Evaluator<G>> Evaluator<G> for CachedEvaluator<E> {
    fn evaluate(&self, state: &G, symmetry: Symmetry) -> Result<NetOutput, EvalError> {
        let key = state.hash();
        if let Some(out) = self.cache.lock().unwrap().get(key) {
            return Ok(out);
        }
        let out = self.inner.evaluate(state, symmetry)?;
        self.cache.lock().unwrap().insert(key, out.clone());
        Ok(out)
    }
}
