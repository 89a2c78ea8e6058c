//! Bounded exponential backoff between delivery attempts

use std::time::Duration;

use rand::Rng;

use crate::config::DeliveryConfig;

/// Retry policy for transient transport failures.
///
/// The delay after attempt `n` is `min(base * 2^(n-1), max_delay)`, optionally
/// perturbed by up to `±jitter_factor` and clamped back into `[0, max_delay]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_factor: 0.0,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.cap_delay_ms),
            jitter_factor: config.jitter_factor,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based, the one just completed)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);

        if self.jitter_factor <= 0.0 || capped.is_zero() {
            return capped;
        }

        let capped_ms = capped.as_millis() as f64;
        let jitter_range = capped_ms * self.jitter_factor.min(1.0);
        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        let jittered = (capped_ms + jitter).clamp(0.0, self.max_delay.as_millis() as f64);

        Duration::from_millis(jittered as u64)
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let multiplier = 1u64 << exponent;
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(multiplier);

        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}
