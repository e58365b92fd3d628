//! Post source trait

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AutopilotSettings, CandidatePost};

/// Supplies candidate posts for one user's monitored accounts
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_candidates(&self, settings: &AutopilotSettings) -> Result<Vec<CandidatePost>, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Post source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Post source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid post source response: {0}")]
    InvalidResponse(String),
}
