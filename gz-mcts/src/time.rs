//! Per-move time budget consulted by the stop predicate.

use std::time::{Duration, Instant};

use gz_core::config::TimeConfig;

/// A started clock for one `think` call. The lag buffer is subtracted from
/// the configured maximum so protocol latency never eats into the move.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    deadline: Option<Instant>,
}

impl TimeBudget {
    pub fn start(cfg: &TimeConfig) -> Self {
        let started = Instant::now();
        let deadline = if cfg.max_time_ms == 0 {
            None
        } else {
            let budget = cfg.max_time_ms.saturating_sub(cfg.lag_buffer_ms).max(10);
            Some(started + Duration::from_millis(budget))
        };
        Self { started, deadline }
    }

    /// A budget that never expires.
    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
        }
    }

    pub fn expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_time_never_expires() {
        let b = TimeBudget::start(&TimeConfig {
            max_time_ms: 0,
            lag_buffer_ms: 100,
        });
        assert!(!b.expired());
    }

    #[test]
    fn lag_buffer_shrinks_but_never_zeroes_the_budget() {
        let b = TimeBudget::start(&TimeConfig {
            max_time_ms: 50,
            lag_buffer_ms: 100,
        });
        // Budget clamps to the 10ms floor instead of expiring instantly.
        assert!(!b.expired());
    }
}
