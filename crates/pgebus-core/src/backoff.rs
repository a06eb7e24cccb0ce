//! Exponential backoff with jitter for retry scheduling (§4.1).

use std::time::Duration;

/// Retry policy configuration.
///
/// # Default Values
///
/// - `base`: 2 seconds
/// - `cap`: 300 seconds
/// - `max_attempts`: 5
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: i32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// `backoff = min(cap, base * 2^(attempts-1))`, jittered by ±20%.
    ///
    /// `attempts` is the 1-indexed attempt count that just failed.
    pub fn delay_for_attempt(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).max(0) as u32;
        let unjittered = self
            .base
            .checked_mul(1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX))
            .unwrap_or(self.cap)
            .min(self.cap);

        let jitter_fraction = fastrand::f64() * 0.4 - 0.2; // [-0.2, 0.2)
        let jittered_secs = unjittered.as_secs_f64() * (1.0 + jitter_fraction);
        Duration::from_secs_f64(jittered_secs.max(0.0))
    }
}
