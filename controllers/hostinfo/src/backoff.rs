//! # Fibonacci Backoff
//!
//! Per-resource retry delays for failed reconciles. The sequence grows more
//! slowly than exponential backoff, so a vCenter outage is retried steadily
//! without hammering it.
//!
//! Default sequence: 5s, 5s, 10s, 15s, 25s, 40s, 65s, ... capped at 300s.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min` and `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);

        result
    }
}

#[derive(Debug)]
struct TrackedBackoff {
    backoff: FibonacciBackoff,
    last_used: Instant,
}

/// Backoff state per resource key (namespace/name)
///
/// Lives with the scheduler, not the reconciler: retry timing belongs to
/// whoever requeues. A failing key is retried at least every `max`, so an
/// entry idle for twice that belongs to a resource that went away and is
/// dropped on the next failure of any key.
#[derive(Debug)]
pub struct BackoffRegistry {
    min: Duration,
    max: Duration,
    idle_after: Duration,
    states: Mutex<HashMap<String, TrackedBackoff>>,
}

impl BackoffRegistry {
    /// Registry whose sequences start at `min` and are capped at `max`
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            idle_after: max.saturating_mul(2),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next retry delay for `key`, advancing its sequence
    pub fn next_backoff(&self, key: &str) -> Duration {
        match self.states.lock() {
            Ok(mut states) => {
                let now = Instant::now();
                states.retain(|_, tracked| now.duration_since(tracked.last_used) <= self.idle_after);

                let tracked = states.entry(key.to_string()).or_insert_with(|| TrackedBackoff {
                    backoff: FibonacciBackoff::new(self.min, self.max),
                    last_used: now,
                });
                tracked.last_used = now;
                tracked.backoff.next_backoff()
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using minimum backoff", e);
                self.min
            }
        }
    }

    /// Forget the error history of `key` (on successful reconciliation)
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.states.lock().map(|states| states.len()).unwrap_or(0)
    }
}

impl Default for BackoffRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}
