//! Search configuration schema.
//!
//! A read-mostly struct handed to the controller at construction; runtime
//! mutation happens only through the controller's explicit setters. The same
//! YAML file drives engine builds and test fixtures.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid memory configuration: {0}")]
    Memory(String),
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Tree search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Move-selection (strength control) settings.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Root Dirichlet noise settings.
    #[serde(default)]
    pub noise: NoiseConfig,
    /// Memory budget for the tree and the evaluator cache.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Per-move time budget.
    #[serde(default)]
    pub time: TimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            selection: SelectionConfig::default(),
            noise: NoiseConfig::default(),
            memory: MemoryConfig::default(),
            time: TimeConfig::default(),
        }
    }
}

/// Tree search settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Number of searcher threads. 0 means one per available CPU.
    #[serde(default)]
    pub threads: usize,
    /// Root visit limit per move. 0 means unlimited.
    #[serde(default)]
    pub max_visits: u32,
    /// Playout limit per move. 0 means unlimited.
    #[serde(default)]
    pub max_playouts: u32,
    /// PUCT exploration constant.
    #[serde(default = "default_c_puct")]
    pub c_puct: f32,
    /// First-play-urgency reduction for non-root nodes.
    #[serde(default = "default_fpu_reduction")]
    pub fpu_reduction: f32,
    /// First-play-urgency reduction at the root.
    #[serde(default = "default_fpu_reduction")]
    pub fpu_root_reduction: f32,
}

fn default_c_puct() -> f32 {
    0.8
}

fn default_fpu_reduction() -> f32 {
    0.25
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_visits: 0,
            max_playouts: 0,
            c_puct: default_c_puct(),
            fpu_reduction: default_fpu_reduction(),
            fpu_root_reduction: default_fpu_reduction(),
        }
    }
}

impl SearchConfig {
    /// Thread count with the 0-means-auto default resolved.
    pub fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Strength-control settings. The winrate bands and prior thresholds of the
/// selection policy are derived from `scale`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    #[serde(default = "default_selection_scale")]
    pub scale: f32,
    /// Minimum visits for a root child to be considered a candidate.
    #[serde(default = "default_selection_min_visits")]
    pub min_visits: u32,
}

fn default_selection_scale() -> f32 {
    0.8
}

fn default_selection_min_visits() -> u32 {
    10
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            scale: default_selection_scale(),
            min_visits: default_selection_min_visits(),
        }
    }
}

/// Root Dirichlet noise. Off unless enabled; only self-play roots turn it on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoiseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_noise_epsilon")]
    pub epsilon: f32,
    #[serde(default = "default_noise_alpha")]
    pub alpha: f32,
    /// Seed for the noise PRNG. Fixes single-threaded runs.
    #[serde(default)]
    pub seed: u64,
}

fn default_noise_epsilon() -> f32 {
    0.25
}

fn default_noise_alpha() -> f32 {
    0.03
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            epsilon: default_noise_epsilon(),
            alpha: default_noise_alpha(),
            seed: 0,
        }
    }
}

/// Memory budget shared between the tree and the evaluator cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Total budget in bytes.
    #[serde(default = "default_max_memory")]
    pub max_bytes: usize,
    /// Percentage of the budget handed to the evaluator cache.
    #[serde(default = "default_cache_ratio_percent")]
    pub cache_ratio_percent: u8,
}

fn default_max_memory() -> usize {
    2 * 1024 * 1024 * 1024
}

fn default_cache_ratio_percent() -> u8 {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_memory(),
            cache_ratio_percent: default_cache_ratio_percent(),
        }
    }
}

/// Per-move time budget consulted by the stop predicate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeConfig {
    /// Maximum thinking time per move in milliseconds. 0 means unlimited.
    #[serde(default)]
    pub max_time_ms: u64,
    /// Safety margin subtracted from the budget to absorb I/O latency.
    #[serde(default = "default_lag_buffer_ms")]
    pub lag_buffer_ms: u64,
}

fn default_lag_buffer_ms() -> u64 {
    100
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            max_time_ms: 0,
            lag_buffer_ms: default_lag_buffer_ms(),
        }
    }
}

/// Node and cache capacities derived from a memory budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySplit {
    pub max_tree_nodes: usize,
    pub cache_entries: usize,
}

/// Rough per-node cost of a materialized child slot, inflated payload
/// amortized in.
const NODE_BYTES: usize = 192;

/// Floor below which neither the tree nor the cache can do useful work.
const BASE_MEMORY: usize = 32 * 1024 * 1024;

impl MemoryConfig {
    /// Split the budget between tree nodes and cache entries.
    ///
    /// `intersections` sizes a cache entry (one policy value per
    /// intersection plus the fixed fields).
    pub fn split(&self, intersections: usize) -> Result<MemorySplit, ConfigError> {
        split_memory(self.max_bytes, self.cache_ratio_percent, intersections)
    }
}

pub fn split_memory(
    max_bytes: usize,
    cache_ratio_percent: u8,
    intersections: usize,
) -> Result<MemorySplit, ConfigError> {
    if !(1..=99).contains(&cache_ratio_percent) {
        return Err(ConfigError::Memory(format!(
            "cache percentage {cache_ratio_percent} not in 1..=99"
        )));
    }
    if max_bytes < BASE_MEMORY {
        return Err(ConfigError::Memory(format!(
            "{max_bytes} bytes is below the {BASE_MEMORY}-byte minimum"
        )));
    }
    let usable = max_bytes - BASE_MEMORY / 2;
    let cache_bytes = usable / 100 * cache_ratio_percent as usize;
    let tree_bytes = usable - cache_bytes;

    let entry_bytes = 4 * intersections + 64;
    let split = MemorySplit {
        max_tree_nodes: tree_bytes / NODE_BYTES,
        cache_entries: cache_bytes / entry_bytes,
    };
    if split.max_tree_nodes == 0 || split.cache_entries == 0 {
        return Err(ConfigError::Memory(
            "budget leaves no room for either the tree or the cache".to_string(),
        ));
    }
    Ok(split)
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
