//! # Exponential Backoff
//!
//! Requeue delays for reconcile errors. Each consecutive failure of the same
//! object doubles the delay, starting at 5 ms and capped at 1000 s. A
//! successful reconcile resets the sequence.
//!
//! Sequence: 5ms, 10ms, 20ms, 40ms, ... 1000s (max).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

/// Default first delay
pub const DEFAULT_BASE: Duration = Duration::from_millis(5);

/// Default ceiling
pub const DEFAULT_MAX: Duration = Duration::from_secs(1000);

/// Exponential backoff calculator
///
/// Generates delays `base * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay, used again after a reset
    base: Duration,
    /// Delay returned by the next call
    current: Duration,
    /// Maximum delay
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_MAX)
    }
}

impl ExponentialBackoff {
    /// Create a new backoff with the given first delay and ceiling.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            current: base,
            max,
        }
    }

    /// Get the next delay and advance the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Delay for a given number of consecutive errors (stateless).
    ///
    /// `error_count` 0 and 1 both map to `base`.
    #[must_use]
    pub fn calculate_for_error_count(error_count: u32, base: Duration, max: Duration) -> Duration {
        let exponent = error_count.saturating_sub(1).min(31);
        base.saturating_mul(1u32 << exponent).min(max)
    }
}

/// Delay used when the registry lock is poisoned
const FALLBACK_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct BackoffState {
    backoff: ExponentialBackoff,
    error_count: u32,
}

/// Backoff sequences keyed by object (`kind/namespace/name`).
///
/// Only objects that are currently failing have an entry.
#[derive(Debug, Default)]
pub struct BackoffRegistry {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffRegistry {
    /// Count an error for `key` and return (delay, consecutive errors).
    pub fn next(&self, key: &str) -> (Duration, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_default();
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                (FALLBACK_DELAY, 0)
            }
        }
    }

    /// Forget `key` after a successful reconcile.
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    /// Number of objects with a running sequence.
    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// True when nothing is failing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::default();

        assert_eq!(backoff.next_backoff(), Duration::from_millis(5));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(10));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(20));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(40));
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let mut backoff = ExponentialBackoff::default();

        // 5ms * 2^18 = 1310.72s, so the cap is hit by the 19th call
        for _ in 0..18 {
            backoff.next_backoff();
        }
        assert_eq!(backoff.next_backoff(), DEFAULT_MAX);
        assert_eq!(backoff.next_backoff(), DEFAULT_MAX);
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));

        backoff.reset();

        // Should restart from beginning after success
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_calculate_for_error_count() {
        let base = Duration::from_millis(5);
        let max = Duration::from_secs(1000);
        assert_eq!(ExponentialBackoff::calculate_for_error_count(0, base, max), base);
        assert_eq!(ExponentialBackoff::calculate_for_error_count(1, base, max), base);
        assert_eq!(
            ExponentialBackoff::calculate_for_error_count(4, base, max),
            Duration::from_millis(40)
        );
        assert_eq!(ExponentialBackoff::calculate_for_error_count(200, base, max), max);
    }

    #[test]
    fn test_registry_forgets_recovered_objects() {
        let registry = BackoffRegistry::default();
        assert_eq!(registry.next("OpensearchUser/search/alice"), (Duration::from_millis(5), 1));
        assert_eq!(registry.next("OpensearchUser/search/alice"), (Duration::from_millis(10), 2));
        assert_eq!(registry.next("OpensearchRole/search/readers"), (Duration::from_millis(5), 1));
        assert_eq!(registry.len(), 2);

        registry.reset("OpensearchUser/search/alice");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.next("OpensearchUser/search/alice"), (Duration::from_millis(5), 1));

        registry.reset("OpensearchUser/search/alice");
        registry.reset("OpensearchRole/search/readers");
        registry.reset("OpensearchRole/search/unknown");
        assert!(registry.is_empty());
    }
}
