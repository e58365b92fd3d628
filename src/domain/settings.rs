//! Per-user autopilot settings (read-only to the queue core)

use serde::{Deserialize, Serialize};

/// Autopilot configuration for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutopilotSettings {
    pub owner_user_id: String,

    /// Master switch for automated replies
    pub is_enabled: bool,

    /// Posts older than this are not replied to
    pub max_tweet_age_minutes: u32,

    /// Ignore retweets/reposts
    pub skip_retweets: bool,

    /// Overrides the hourly window limit when set
    pub max_replies_per_window: Option<u32>,
}

impl AutopilotSettings {
    /// Enabled settings with the usual defaults.
    pub fn enabled(owner_user_id: impl Into<String>) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            is_enabled: true,
            max_tweet_age_minutes: 60,
            skip_retweets: true,
            max_replies_per_window: None,
        }
    }

    pub fn with_max_age(mut self, minutes: u32) -> Self {
        self.max_tweet_age_minutes = minutes;
        self
    }

    pub fn with_skip_retweets(mut self, skip: bool) -> Self {
        self.skip_retweets = skip;
        self
    }

    pub fn with_window_limit(mut self, limit: u32) -> Self {
        self.max_replies_per_window = Some(limit);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}
