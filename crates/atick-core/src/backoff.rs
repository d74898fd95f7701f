//! Connection backoff bookkeeping.
//!
//! After `max_failures` consecutive connection failures, new attempts are
//! refused until `base_delay * 2^min(failures, 8)` has elapsed since the last
//! failure. A successful connection clears the count.
//!
//! ```
//! use std::time::Duration;
//! use atick_core::{BackoffConfig, BackoffState};
//!
//! let config = BackoffConfig::default();
//! assert_eq!(config.delay_for(5), Duration::from_secs(64));
//! assert_eq!(config.delay_for(20), Duration::from_secs(512));
//!
//! let state = BackoffState::new(config);
//! assert_eq!(state.failures(), 0);
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Largest exponent applied to the base delay.
pub const MAX_BACKOFF_EXPONENT: u32 = 8;

/// Backoff thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Consecutive failures tolerated before backoff applies.
    pub max_failures: u32,
    /// Delay multiplied by `2^min(failures, 8)`.
    pub base_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffConfig {
    /// Create a config with custom thresholds.
    pub fn new(max_failures: u32, base_delay: Duration) -> Self {
        Self {
            max_failures,
            base_delay,
        }
    }

    /// Delay enforced after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Failure count and time of the last failure.
#[derive(Debug, Clone)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl BackoffState {
    /// Create an empty state.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            last_failure: None,
        }
    }

    /// The thresholds in use.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Consecutive failures recorded since the last success.
    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// When the last failure was recorded.
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Time left until a new attempt is allowed, if any.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.consecutive_failures < self.config.max_failures {
            return None;
        }
        let last = self.last_failure?;
        let delay = self.config.delay_for(self.consecutive_failures);
        let elapsed = now.saturating_duration_since(last);
        (elapsed < delay).then(|| delay - elapsed)
    }

    /// Whether attempts are currently refused.
    pub fn is_blocked(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }

    /// Refuse the attempt with [`Error::BackoffActive`] while backoff applies.
    pub fn check(&self, now: Instant) -> Result<()> {
        match self.remaining(now) {
            Some(remaining) => {
                debug!(
                    failures = self.consecutive_failures,
                    "Backoff active, {:.1}s remaining",
                    remaining.as_secs_f64()
                );
                Err(Error::BackoffActive {
                    remaining,
                    failures: self.consecutive_failures,
                })
            }
            None => Ok(()),
        }
    }

    /// Record one failed attempt and return the new count.
    pub fn record_failure(&mut self, now: Instant) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
        if self.consecutive_failures >= self.config.max_failures {
            warn!(
                failures = self.consecutive_failures,
                "Connection failing repeatedly, backing off for {:?}",
                self.config.delay_for(self.consecutive_failures)
            );
        }
        self.consecutive_failures
    }

    /// Clear the failure count after a success.
    pub fn reset(&mut self) {
        if self.consecutive_failures > 0 {
            debug!(
                failures = self.consecutive_failures,
                "Resetting connection backoff"
            );
        }
        self.consecutive_failures = 0;
        self.last_failure = None;
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_secs(2));
        assert_eq!(config.delay_for(5), Duration::from_secs(64));
        assert_eq!(config.delay_for(8), Duration::from_secs(512));
        assert_eq!(config.delay_for(9), Duration::from_secs(512));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(512));
    }

    #[test]
    fn test_below_threshold_never_blocks() {
        let mut state = BackoffState::default();
        let now = Instant::now();
        for _ in 0..4 {
            state.record_failure(now);
        }
        assert_eq!(state.failures(), 4);
        assert!(state.check(now).is_ok());
    }

    #[test]
    fn test_blocks_after_max_failures() {
        let mut state = BackoffState::default();
        let now = Instant::now();
        for _ in 0..5 {
            state.record_failure(now);
        }

        let err = state.check(now + Duration::from_secs(10)).unwrap_err();
        match err {
            Error::BackoffActive {
                remaining,
                failures,
            } => {
                assert_eq!(failures, 5);
                assert_eq!(remaining, Duration::from_secs(54));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unblocks_after_delay() {
        let mut state = BackoffState::default();
        let now = Instant::now();
        for _ in 0..5 {
            state.record_failure(now);
        }
        assert!(state.is_blocked(now + Duration::from_secs(63)));
        assert!(!state.is_blocked(now + Duration::from_secs(64)));
        assert!(state.check(now + Duration::from_secs(65)).is_ok());
    }

    #[test]
    fn test_delay_measured_from_last_failure() {
        let mut state = BackoffState::default();
        let start = Instant::now();
        for _ in 0..5 {
            state.record_failure(start);
        }
        // Sixth failure once the window opened doubles the delay.
        let later = start + Duration::from_secs(70);
        state.record_failure(later);
        assert_eq!(state.failures(), 6);
        assert_eq!(
            state.remaining(later),
            Some(Duration::from_secs(128))
        );
    }

    #[test]
    fn test_reset_clears_failures() {
        let mut state = BackoffState::default();
        let now = Instant::now();
        for _ in 0..7 {
            state.record_failure(now);
        }
        state.reset();
        assert_eq!(state.failures(), 0);
        assert!(state.last_failure().is_none());
        assert!(state.check(now).is_ok());
    }

    #[test]
    fn test_custom_config() {
        let mut state = BackoffState::new(BackoffConfig::new(1, Duration::from_millis(100)));
        let now = Instant::now();
        state.record_failure(now);
        assert_eq!(state.remaining(now), Some(Duration::from_millis(200)));
    }
}
