//! Reply executor: one send attempt for one queue entry.
//!
//! claim -> send (under timeout) -> resolve. The claim is the only lock;
//! losing it is a normal outcome, not an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{Clock, to_chrono};
use crate::domain::ReplyQueueEntry;
use crate::error::{ReplyError, Result};
use crate::posting::{PostError, PostReceipt, PostingClient, ReplyTarget};
use crate::rate_limit::{BackoffPolicy, JitterSource, RandomJitter};
use crate::store::ReplyQueueStore;

/// Executor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Total send attempts before an entry fails on transient errors
    pub max_attempts: u32,
    /// Upper bound on one `PostingClient::send`
    pub send_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            send_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// How one execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Sent { external_id: Option<String> },
    /// Transient failure with attempts left
    Requeued { attempt: u32, retry_at: DateTime<Utc> },
    Failed { error: String },
    /// Another worker claimed or resolved the entry first
    Skipped,
}

pub struct ReplyExecutor {
    store: Arc<dyn ReplyQueueStore>,
    posting: Arc<dyn PostingClient>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    config: ExecutorConfig,
}

impl ReplyExecutor {
    pub fn new(
        store: Arc<dyn ReplyQueueStore>,
        posting: Arc<dyn PostingClient>,
        clock: Arc<dyn Clock>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            posting,
            clock,
            jitter: Arc::new(RandomJitter),
            config,
        }
    }

    /// Replace the random backoff jitter.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Attempt to send `entry` once and record the result.
    ///
    /// Errors are storage failures only; posting failures are outcomes.
    pub async fn execute(&self, entry: &ReplyQueueEntry) -> Result<ExecutionOutcome> {
        if !self.store.claim(&entry.id, self.clock.now())? {
            tracing::debug!(entry_id = %entry.id, "Entry already claimed, skipping");
            return Ok(ExecutionOutcome::Skipped);
        }

        // Re-read so attempt_count and text reflect the row we actually claimed.
        let claimed = self
            .store
            .get(&entry.id)?
            .ok_or_else(|| ReplyError::EntryNotFound(entry.id.clone()))?;
        let attempt = claimed.attempt_count + 1;

        let result = self.send(&claimed).await;
        let now = self.clock.now();

        match result {
            Ok(receipt) => {
                let sent = self
                    .store
                    .mark_sent(&claimed.id, now, receipt.external_id.as_deref())
                    .inspect_err(|e| {
                        tracing::error!(entry_id = %claimed.id, error = %e, "Reply posted but not recorded as sent");
                    })?;
                tracing::info!(entry_id = %sent.id, attempt, "Reply sent");
                Ok(ExecutionOutcome::Sent {
                    external_id: sent.external_id,
                })
            }
            Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                let delay = self.config.backoff.delay_for(attempt, self.jitter.as_ref());
                let retry_at = now + to_chrono(delay);
                self.store.requeue(&claimed.id, retry_at, &e.to_string(), now)?;
                tracing::warn!(
                    entry_id = %claimed.id,
                    attempt,
                    retry_in_secs = delay.as_secs(),
                    error = %e,
                    "Transient send failure, requeued"
                );
                Ok(ExecutionOutcome::Requeued { attempt, retry_at })
            }
            Err(e) => {
                let error = if e.is_transient() {
                    format!("{} (gave up after {} attempts)", e, attempt)
                } else {
                    e.to_string()
                };
                self.store.mark_failed(&claimed.id, &error, now)?;
                tracing::warn!(entry_id = %claimed.id, attempt, error = %error, "Reply failed");
                Ok(ExecutionOutcome::Failed { error })
            }
        }
    }

    async fn send(&self, entry: &ReplyQueueEntry) -> std::result::Result<PostReceipt, PostError> {
        let target = ReplyTarget::from(entry);
        let timeout = self.config.send_timeout;
        match tokio::time::timeout(timeout, self.posting.send(&entry.reply_text, &target)).await {
            Ok(result) => result,
            Err(_) => Err(PostError::Transient(format!("send timed out after {}s", timeout.as_secs()))),
        }
    }
}
