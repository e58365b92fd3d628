//! Autopilot policy: should this user reply to this post at all?

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::domain::{AutopilotSettings, CandidatePost};

/// Outcome of a policy evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub allow: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
        }
    }
}

/// Gates candidate posts against a user's autopilot settings.
pub struct AutopilotPolicy {
    clock: Arc<dyn Clock>,
}

impl AutopilotPolicy {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Evaluate in order: enabled, age, retweet.
    pub fn evaluate(&self, settings: &AutopilotSettings, post: &CandidatePost) -> PolicyDecision {
        if !settings.is_enabled {
            return PolicyDecision::deny("autopilot is disabled");
        }

        let age = post.age_at(self.clock.now());
        let max_age = chrono::Duration::minutes(i64::from(settings.max_tweet_age_minutes));
        if age > max_age {
            return PolicyDecision::deny(format!(
                "post age {} min exceeds max age of {} min",
                age.num_minutes(),
                settings.max_tweet_age_minutes
            ));
        }

        if settings.skip_retweets && post.is_retweet() {
            return PolicyDecision::deny("post is a retweet");
        }

        PolicyDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn policy() -> AutopilotPolicy {
        AutopilotPolicy::new(Arc::new(ManualClock::new(now())))
    }

    fn post(minutes_old: i64, text: &str) -> CandidatePost {
        CandidatePost {
            post_ref: "p1".to_string(),
            author_account_ref: "@author".to_string(),
            text: text.to_string(),
            published_at: now() - chrono::Duration::minutes(minutes_old),
            is_repost: false,
        }
    }

    #[test]
    fn test_allows_fresh_post() {
        let decision = policy().evaluate(&AutopilotSettings::enabled("u"), &post(10, "hello"));
        assert_eq!(decision, PolicyDecision::allow());
    }

    #[test]
    fn test_denies_when_disabled() {
        let settings = AutopilotSettings::enabled("u").disabled();
        let decision = policy().evaluate(&settings, &post(1, "hello"));
        assert!(!decision.allow);
        assert!(decision.reason.unwrap().contains("disabled"));
    }

    #[test]
    fn test_denies_old_post_with_age_reason() {
        let settings = AutopilotSettings::enabled("u").with_max_age(60);
        let decision = policy().evaluate(&settings, &post(61, "hello"));
        assert!(!decision.allow);
        assert!(decision.reason.unwrap().contains("age"));
    }

    #[test]
    fn test_allows_post_at_exact_max_age() {
        let settings = AutopilotSettings::enabled("u").with_max_age(60);
        assert!(policy().evaluate(&settings, &post(60, "hello")).allow);
    }

    #[test]
    fn test_denies_retweet_text() {
        let decision = policy().evaluate(&AutopilotSettings::enabled("u"), &post(1, "RT @someone: news"));
        assert!(!decision.allow);
        assert!(decision.reason.unwrap().contains("retweet"));
    }

    #[test]
    fn test_denies_repost_flag() {
        let mut candidate = post(1, "news");
        candidate.is_repost = true;
        assert!(!policy().evaluate(&AutopilotSettings::enabled("u"), &candidate).allow);
    }

    #[test]
    fn test_allows_retweet_when_not_skipping() {
        let settings = AutopilotSettings::enabled("u").with_skip_retweets(false);
        assert!(policy().evaluate(&settings, &post(1, "RT @someone: news")).allow);
    }

    #[test]
    fn test_future_post_is_fresh() {
        let decision = policy().evaluate(&AutopilotSettings::enabled("u"), &post(-5, "hello"));
        assert!(decision.allow);
    }
}
