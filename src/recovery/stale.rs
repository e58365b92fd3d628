//! Stale claim recovery

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::to_chrono;
use crate::error::{ReplyError, Result};
use crate::store::ReplyQueueStore;

/// `last_error` written on recovered entries.
pub const INTERRUPTED_ERROR: &str = "interrupted during send";

/// Result of recovering a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RecoveryResult {
    /// Entry was moved to `failed`.
    MarkedFailed { entry_id: String },

    /// Entry left `in_flight` between listing and updating (another worker resolved it).
    AlreadyResolved { entry_id: String },

    /// Recovery failed for another reason.
    Failed { entry_id: String, error: String },
}

impl RecoveryResult {
    pub fn entry_id(&self) -> &str {
        match self {
            RecoveryResult::MarkedFailed { entry_id }
            | RecoveryResult::AlreadyResolved { entry_id }
            | RecoveryResult::Failed { entry_id, .. } => entry_id,
        }
    }
}

/// Statistics about a recovery operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub marked_failed: usize,
    pub already_resolved: usize,
    pub failed: usize,
    pub results: Vec<RecoveryResult>,
}

impl RecoveryStats {
    pub fn total(&self) -> usize {
        self.marked_failed + self.already_resolved + self.failed
    }

    fn record(&mut self, result: RecoveryResult) {
        match &result {
            RecoveryResult::MarkedFailed { .. } => self.marked_failed += 1,
            RecoveryResult::AlreadyResolved { .. } => self.already_resolved += 1,
            RecoveryResult::Failed { .. } => self.failed += 1,
        }
        self.results.push(result);
    }
}

/// Fail every entry claimed more than `lease` before `now`.
///
/// Fails as a whole only if the stale entries cannot be listed.
pub fn recover_stale_claims(store: &dyn ReplyQueueStore, now: DateTime<Utc>, lease: Duration) -> Result<RecoveryStats> {
    let cutoff = now - to_chrono(lease);
    let stale = store.list_stale_in_flight(cutoff)?;
    let mut stats = RecoveryStats::default();

    for entry in stale {
        let result = match store.mark_failed(&entry.id, INTERRUPTED_ERROR, now) {
            Ok(_) => {
                tracing::warn!(entry_id = %entry.id, claimed_at = %entry.updated_at, "Recovered interrupted send");
                RecoveryResult::MarkedFailed { entry_id: entry.id }
            }
            Err(ReplyError::InvalidTransition { .. }) => RecoveryResult::AlreadyResolved { entry_id: entry.id },
            Err(e) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to recover entry");
                RecoveryResult::Failed {
                    entry_id: entry.id,
                    error: e.to_string(),
                }
            }
        };
        stats.record(result);
    }

    if stats.total() > 0 {
        tracing::info!(
            marked_failed = stats.marked_failed,
            already_resolved = stats.already_resolved,
            failed = stats.failed,
            "Stale claim recovery finished"
        );
    }
    Ok(stats)
}
