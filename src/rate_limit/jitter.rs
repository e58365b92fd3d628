//! Randomness used for delay spreading.

use std::time::Duration;

use rand::Rng;

/// Source of a delay picked uniformly from a range.
pub trait JitterSource: Send + Sync {
    /// Pick a duration in `[min, max]`. Implementations return `min` when `max <= min`.
    fn sample(&self, min: Duration, max: Duration) -> Duration;
}

/// Uniform random jitter from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let lo = min.as_millis() as u64;
        let hi = max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

/// Deterministic jitter at a fixed position within the range.
///
/// `fraction` 0.0 always yields `min`, 1.0 always yields `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedJitter {
    fraction: f64,
}

impl FixedJitter {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    /// Always the low end of the range.
    pub fn min() -> Self {
        Self::new(0.0)
    }

    /// Always the high end of the range.
    pub fn max() -> Self {
        Self::new(1.0)
    }
}

impl JitterSource for FixedJitter {
    fn sample(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        min + (max - min).mul_f64(self.fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_jitter_in_range() {
        let jitter = RandomJitter;
        let min = Duration::from_secs(45);
        let max = Duration::from_secs(180);
        for _ in 0..200 {
            let d = jitter.sample(min, max);
            assert!(d >= min && d <= max, "{:?} out of range", d);
        }
    }

    #[test]
    fn test_random_jitter_degenerate_range() {
        let d = Duration::from_secs(5);
        assert_eq!(RandomJitter.sample(d, d), d);
        assert_eq!(RandomJitter.sample(d, Duration::ZERO), d);
    }

    #[test]
    fn test_fixed_jitter_positions() {
        let min = Duration::from_secs(10);
        let max = Duration::from_secs(20);
        assert_eq!(FixedJitter::min().sample(min, max), min);
        assert_eq!(FixedJitter::max().sample(min, max), max);
        assert_eq!(FixedJitter::new(0.5).sample(min, max), Duration::from_secs(15));
    }

    #[test]
    fn test_fixed_jitter_clamps_fraction() {
        let min = Duration::from_secs(10);
        let max = Duration::from_secs(20);
        assert_eq!(FixedJitter::new(7.0).sample(min, max), max);
        assert_eq!(FixedJitter::new(-1.0).sample(min, max), min);
    }
}
