//! Reply queue entry and its lifecycle
//!
//! A queue entry is a persisted intent to send exactly one reply at or after
//! `scheduled_for`. Status moves forward only:
//!
//! ```text
//! pending -> in_flight -> sent | failed
//!    |           |
//!    |           +------> pending (requeue after transient failure)
//!    +-> cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::generate_entry_id;

/// Maximum stored length of `last_error`.
pub const MAX_ERROR_CHARS: usize = 1_024;

/// A persisted reply intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyQueueEntry {
    //=== Identity ===
    /// Unique identifier (timestamp + random suffix: "1738300800123-a1b2c3d4")
    pub id: String,

    /// User on whose behalf the reply is sent
    pub owner_user_id: String,

    /// Account the reply is directed at
    pub target_account_ref: String,

    /// Post being replied to
    pub source_post_ref: String,

    //=== Content ===
    pub reply_text: String,

    /// True when the text came from the generator rather than the user
    pub is_auto_generated: bool,

    //=== Runtime State ===
    pub status: EntryStatus,

    /// Earliest time the reply may be sent
    pub scheduled_for: DateTime<Utc>,

    /// Set iff status is `sent`
    pub sent_at: Option<DateTime<Utc>>,

    /// Id assigned by the posting service on success
    pub external_id: Option<String>,

    /// Number of resolved send attempts
    pub attempt_count: u32,

    pub last_error: Option<String>,

    //=== Timestamps ===
    pub created_at: DateTime<Utc>,

    /// Time of the last transition; for `in_flight` this is the claim time
    pub updated_at: DateTime<Utc>,
}

impl ReplyQueueEntry {
    /// Build a fresh pending entry from enqueue input.
    pub fn from_new(new: NewReplyEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_entry_id(),
            owner_user_id: new.owner_user_id,
            target_account_ref: new.target_account_ref,
            source_post_ref: new.source_post_ref,
            reply_text: new.reply_text,
            is_auto_generated: new.is_auto_generated,
            status: EntryStatus::Pending,
            scheduled_for: new.scheduled_for,
            sent_at: None,
            external_id: None,
            attempt_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the entry is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Pending && self.scheduled_for <= now
    }

    /// Timestamp used when counting this entry against rate windows.
    pub fn activity_at(&self) -> DateTime<Utc> {
        match self.status {
            EntryStatus::Sent => self.sent_at.unwrap_or(self.updated_at),
            EntryStatus::InFlight => self.updated_at,
            _ => self.scheduled_for,
        }
    }

    //=== Transitions ===
    // Stores check the current status before calling these.

    pub(crate) fn claim(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != EntryStatus::Pending {
            return false;
        }
        self.status = EntryStatus::InFlight;
        self.updated_at = now;
        true
    }

    pub(crate) fn resolve_sent(&mut self, sent_at: DateTime<Utc>, external_id: Option<&str>) {
        self.status = EntryStatus::Sent;
        self.sent_at = Some(sent_at);
        self.external_id = external_id.map(str::to_string);
        self.attempt_count += 1;
        self.last_error = None;
        self.updated_at = sent_at;
    }

    pub(crate) fn resolve_failed(&mut self, error: &str, now: DateTime<Utc>) {
        self.status = EntryStatus::Failed;
        self.attempt_count += 1;
        self.last_error = Some(truncate_error(error));
        self.updated_at = now;
    }

    pub(crate) fn resolve_requeued(&mut self, scheduled_for: DateTime<Utc>, error: &str, now: DateTime<Utc>) {
        self.status = EntryStatus::Pending;
        self.scheduled_for = scheduled_for.max(self.created_at);
        self.attempt_count += 1;
        self.last_error = Some(truncate_error(error));
        self.updated_at = now;
    }

    pub(crate) fn resolve_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = EntryStatus::Cancelled;
        self.updated_at = now;
    }
}

/// Input for `ReplyQueueStore::enqueue`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewReplyEntry {
    pub owner_user_id: String,
    pub target_account_ref: String,
    pub source_post_ref: String,
    pub reply_text: String,
    pub is_auto_generated: bool,
    pub scheduled_for: DateTime<Utc>,
}

impl NewReplyEntry {
    /// Create enqueue input for an automatically generated reply.
    pub fn auto(
        owner_user_id: impl Into<String>,
        target_account_ref: impl Into<String>,
        source_post_ref: impl Into<String>,
        reply_text: impl Into<String>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            target_account_ref: target_account_ref.into(),
            source_post_ref: source_post_ref.into(),
            reply_text: reply_text.into(),
            is_auto_generated: true,
            scheduled_for,
        }
    }

    /// Mark the text as written by the user.
    pub fn manual(mut self) -> Self {
        self.is_auto_generated = false;
        self
    }

    /// Check enqueue input; `max_chars` bounds the reply length.
    pub fn validate(&self, now: DateTime<Utc>, max_chars: usize) -> Result<(), String> {
        if self.owner_user_id.trim().is_empty() {
            return Err("owner_user_id is empty".to_string());
        }
        if self.target_account_ref.trim().is_empty() {
            return Err("target_account_ref is empty".to_string());
        }
        if self.source_post_ref.trim().is_empty() {
            return Err("source_post_ref is empty".to_string());
        }
        if self.reply_text.trim().is_empty() {
            return Err("reply_text is empty".to_string());
        }
        let chars = self.reply_text.chars().count();
        if chars > max_chars {
            return Err(format!("reply_text has {} chars, limit is {}", chars, max_chars));
        }
        if self.scheduled_for < now {
            return Err("scheduled_for is earlier than creation time".to_string());
        }
        Ok(())
    }
}

/// Result of an idempotent enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// A new pending entry was created
    Created(ReplyQueueEntry),
    /// A non-terminal entry for the same (owner, source post) already existed
    Existing(ReplyQueueEntry),
}

impl Enqueued {
    pub fn entry(&self) -> &ReplyQueueEntry {
        match self {
            Enqueued::Created(entry) | Enqueued::Existing(entry) => entry,
        }
    }

    pub fn into_entry(self) -> ReplyQueueEntry {
        match self {
            Enqueued::Created(entry) | Enqueued::Existing(entry) => entry,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Enqueued::Created(_))
    }
}

/// Queue entry status state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for `scheduled_for`
    Pending,
    /// Claimed by an executor
    InFlight,
    /// Posted successfully
    Sent,
    /// Retries exhausted or permanent failure
    Failed,
    /// Withdrawn by an operator before sending
    Cancelled,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 5] = [
        EntryStatus::Pending,
        EntryStatus::InFlight,
        EntryStatus::Sent,
        EntryStatus::Failed,
        EntryStatus::Cancelled,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::InFlight => "in_flight",
            EntryStatus::Sent => "sent",
            EntryStatus::Failed => "failed",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Sent | EntryStatus::Failed | EntryStatus::Cancelled)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown entry status: {}", s))
    }
}

/// Clip an error message to `MAX_ERROR_CHARS`.
pub fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_CHARS {
        return error.to_string();
    }
    let mut out: String = error.chars().take(MAX_ERROR_CHARS - 3).collect();
    out.push_str("...");
    out
}
