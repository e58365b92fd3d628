//! Candidate source posts discovered on monitored accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post that might receive an automated reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidatePost {
    /// Platform id of the post
    pub post_ref: String,

    /// Account that published it; replies are directed here
    pub author_account_ref: String,

    pub text: String,

    pub published_at: DateTime<Utc>,

    /// Platform-reported repost flag
    #[serde(default)]
    pub is_repost: bool,
}

impl CandidatePost {
    /// True for reposts, including old-style "RT @user" text retweets.
    pub fn is_retweet(&self) -> bool {
        self.is_repost || self.text.trim_start().starts_with("RT @")
    }

    /// Age of the post at `now`; zero for posts stamped in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.published_at).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(text: &str, is_repost: bool) -> CandidatePost {
        CandidatePost {
            post_ref: "p1".to_string(),
            author_account_ref: "@someone".to_string(),
            text: text.to_string(),
            published_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            is_repost,
        }
    }

    #[test]
    fn test_is_retweet_flag() {
        assert!(post("hello", true).is_retweet());
        assert!(!post("hello", false).is_retweet());
    }

    #[test]
    fn test_is_retweet_text_prefix() {
        assert!(post("RT @other: hello", false).is_retweet());
        assert!(!post("Not an RT @other", false).is_retweet());
    }

    #[test]
    fn test_age_never_negative() {
        let p = post("hello", false);
        let before = p.published_at - chrono::Duration::minutes(5);
        assert_eq!(p.age_at(before), chrono::Duration::zero());
        let after = p.published_at + chrono::Duration::minutes(61);
        assert_eq!(p.age_at(after), chrono::Duration::minutes(61));
    }
}
