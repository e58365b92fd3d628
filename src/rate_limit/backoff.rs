//! Retry backoff for transient send failures.

use std::time::Duration;

use super::jitter::JitterSource;

/// Exponent cap: the un-jittered delay stops doubling after `base * 2^6`.
const MAX_EXPONENT: u32 = 6;

/// Exponential backoff with proportional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound on any delay, jitter included
    pub max: Duration,
    /// Extra random delay as a fraction of the un-jittered delay
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(15 * 60),
            jitter_ratio: 0.2,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter_ratio: f64) -> Self {
        Self {
            base,
            max,
            jitter_ratio: jitter_ratio.max(0.0),
        }
    }

    /// Delay before retrying after the given attempt (1-based).
    ///
    /// `base * 2^(attempt - 1)`, plus up to `jitter_ratio` of that, capped at `max`.
    pub fn delay_for(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let raw = self.base.saturating_mul(2u32.pow(exponent));
        let extra = jitter.sample(Duration::ZERO, raw.mul_f64(self.jitter_ratio));
        raw.saturating_add(extra).min(self.max)
    }
}
