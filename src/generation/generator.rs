//! Content generator trait and types

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::CandidatePost;

/// Produces reply text for a candidate post
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn generate(
        &self,
        post: &CandidatePost,
        context: &GenerationContext,
    ) -> Result<GeneratedReply, GenerationError>;
}

/// What the generator knows about the reply being written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationContext {
    pub owner_user_id: String,
    /// Longest reply the queue will accept
    pub max_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generator timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),

    #[error("Reply rejected: {0}")]
    Rejected(String),

    #[error("All generators failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}
