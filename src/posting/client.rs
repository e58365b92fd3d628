//! Posting client trait and result types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ReplyQueueEntry;

/// Sends one reply to the external platform.
#[async_trait]
pub trait PostingClient: Send + Sync {
    async fn send(&self, text: &str, target: &ReplyTarget) -> Result<PostReceipt, PostError>;
}

/// Where a reply goes and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub owner_user_id: String,
    pub target_account_ref: String,
    /// Post being replied to
    pub in_reply_to: String,
}

impl From<&ReplyQueueEntry> for ReplyTarget {
    fn from(entry: &ReplyQueueEntry) -> Self {
        Self {
            owner_user_id: entry.owner_user_id.clone(),
            target_account_ref: entry.target_account_ref.clone(),
            in_reply_to: entry.source_post_ref.clone(),
        }
    }
}

/// Successful post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    /// Platform id of the created reply, when the service reports one
    pub external_id: Option<String>,
}

impl PostReceipt {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            external_id: Some(id.into()),
        }
    }
}

/// Classified posting failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostError {
    /// Timeouts, network errors, rate limiting, provisional auth failures
    #[error("Transient posting error: {0}")]
    Transient(String),

    /// Content rejected, target gone, credentials revoked
    #[error("Permanent posting error: {0}")]
    Permanent(String),
}

impl PostError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PostError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            PostError::Transient(msg) | PostError::Permanent(msg) => msg,
        }
    }
}
