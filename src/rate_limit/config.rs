//! Pacing thresholds.

use std::time::Duration;

use crate::error::{ReplyError, Result};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    //=== Rolling windows ===
    /// Max replies per user in `hourly_window`, unless the user's settings override it
    pub hourly_limit: u32,
    pub hourly_window: Duration,

    /// Max replies per user in `daily_window`
    pub daily_limit: u32,
    pub daily_window: Duration,

    /// Max replies to one target account in `target_window`
    pub target_limit: u32,
    pub target_window: Duration,

    //=== Spacing ===
    /// Minimum gap between two replies to the same target
    pub target_min_spacing: Duration,

    /// Base delay is drawn uniformly from `[jitter_min, jitter_max]`
    pub jitter_min: Duration,
    pub jitter_max: Duration,

    /// Floor for any computed delay
    pub min_delay: Duration,

    /// Delays longer than this are denied instead of scheduled
    pub max_horizon: Duration,

    /// Count pending entries toward windows (at their scheduled time)
    pub count_pending: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 10,
            hourly_window: HOUR,
            daily_limit: 50,
            daily_window: 24 * HOUR,
            target_limit: 1,
            target_window: 20 * MINUTE,
            target_min_spacing: 20 * MINUTE,
            jitter_min: Duration::from_secs(45),
            jitter_max: Duration::from_secs(180),
            min_delay: Duration::from_secs(5),
            max_horizon: 24 * HOUR,
            count_pending: true,
        }
    }
}

impl RateLimitConfig {
    /// Reject configurations that cannot pace anything sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.hourly_window.is_zero() || self.daily_window.is_zero() || self.target_window.is_zero() {
            return Err(ReplyError::Validation("rate windows must be non-zero".to_string()));
        }
        if self.jitter_max < self.jitter_min {
            return Err(ReplyError::Validation(format!(
                "jitter_max ({:?}) is below jitter_min ({:?})",
                self.jitter_max, self.jitter_min
            )));
        }
        if self.min_delay.is_zero() {
            return Err(ReplyError::Validation("min_delay must be non-zero".to_string()));
        }
        if self.max_horizon < self.min_delay {
            return Err(ReplyError::Validation("max_horizon is below min_delay".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.hourly_limit, 10);
        assert_eq!(config.daily_limit, 50);
        assert_eq!(config.target_limit, 1);
        assert_eq!(config.target_window, Duration::from_secs(1200));
        assert_eq!(config.jitter_min, Duration::from_secs(45));
        assert_eq!(config.jitter_max, Duration::from_secs(180));
        assert_eq!(config.max_horizon, Duration::from_secs(86_400));
        assert!(config.count_pending);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_jitter() {
        let config = RateLimitConfig {
            jitter_min: Duration::from_secs(100),
            jitter_max: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = RateLimitConfig {
            hourly_window: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_min_delay() {
        let config = RateLimitConfig {
            min_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
