//! Store trait definitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::{AutopilotSettings, EntryStatus, Enqueued, NewReplyEntry, ReplyQueueEntry};
use crate::error::{ReplyError, Result};

/// Default reply length limit used by enqueue validation.
pub const DEFAULT_MAX_REPLY_CHARS: usize = 280;

/// Persistence for reply queue entries.
///
/// `claim` is the only mutual-exclusion mechanism in the system, so every
/// implementation must make it an atomic conditional transition.
pub trait ReplyQueueStore: Send + Sync {
    /// Create a pending entry, or return the open entry for the same
    /// (owner, source post) pair.
    fn enqueue(&self, new: NewReplyEntry, now: DateTime<Utc>) -> Result<Enqueued>;

    /// Get an entry by ID.
    fn get(&self, id: &str) -> Result<Option<ReplyQueueEntry>>;

    /// Pending entries with `scheduled_for <= now`, oldest schedule first.
    fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ReplyQueueEntry>>;

    /// Atomically move pending -> in_flight. Returns false if the entry is
    /// no longer pending (someone else claimed or resolved it).
    fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// in_flight -> sent
    fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>, external_id: Option<&str>) -> Result<ReplyQueueEntry>;

    /// in_flight -> failed
    fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<ReplyQueueEntry>;

    /// in_flight -> pending with a new schedule and attempt_count + 1
    fn requeue(
        &self,
        id: &str,
        scheduled_for: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ReplyQueueEntry>;

    /// pending -> cancelled
    fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<ReplyQueueEntry>;

    /// List entries, newest first, optionally filtered by status.
    fn list(&self, status: Option<EntryStatus>, limit: usize) -> Result<Vec<ReplyQueueEntry>>;

    /// Count entries per status. Every status is present in the map.
    fn count_by_status(&self) -> Result<BTreeMap<EntryStatus, usize>>;

    /// Activity timestamps for rate windows: sent and in-flight entries of
    /// `owner` (optionally only those aimed at `target`) at or after `since`,
    /// plus pending ones when `include_pending` is set. Sorted ascending.
    fn activity_since(
        &self,
        owner: &str,
        target: Option<&str>,
        since: DateTime<Utc>,
        include_pending: bool,
    ) -> Result<Vec<DateTime<Utc>>>;

    /// Whether any entry, in any status, exists for this source post.
    fn has_source(&self, owner: &str, source_post_ref: &str) -> Result<bool>;

    /// In-flight entries claimed before `claimed_before`.
    fn list_stale_in_flight(&self, claimed_before: DateTime<Utc>) -> Result<Vec<ReplyQueueEntry>>;
}

/// Read-only source of per-user autopilot settings.
pub trait SettingsStore: Send + Sync {
    fn get_settings(&self, owner_user_id: &str) -> Result<Option<AutopilotSettings>>;

    /// All users with autopilot switched on.
    fn list_enabled(&self) -> Result<Vec<AutopilotSettings>>;
}

/// Build the error for a transition that did not apply.
pub(crate) fn transition_error(id: &str, current: Option<EntryStatus>, to: EntryStatus) -> ReplyError {
    match current {
        Some(from) => ReplyError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        },
        None => ReplyError::EntryNotFound(id.to_string()),
    }
}

/// A map with a zero for every status.
pub(crate) fn empty_counts() -> BTreeMap<EntryStatus, usize> {
    EntryStatus::ALL.into_iter().map(|s| (s, 0)).collect()
}

/// Whether an entry counts toward rate windows.
pub(crate) fn counts_as_activity(status: EntryStatus, include_pending: bool) -> bool {
    match status {
        EntryStatus::Sent | EntryStatus::InFlight => true,
        EntryStatus::Pending => include_pending,
        EntryStatus::Failed | EntryStatus::Cancelled => false,
    }
}
