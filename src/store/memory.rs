//! In-memory store implementations.
//!
//! A single mutex guards the whole map, which makes `claim` trivially
//! atomic. Used by tests and by embedders that bring their own durability.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::traits::{
    DEFAULT_MAX_REPLY_CHARS, ReplyQueueStore, SettingsStore, counts_as_activity, empty_counts, transition_error,
};
use crate::domain::{AutopilotSettings, EntryStatus, Enqueued, NewReplyEntry, ReplyQueueEntry};
use crate::error::{ReplyError, Result};

/// Mutex-guarded map of queue entries.
#[derive(Debug)]
pub struct MemoryQueueStore {
    entries: Mutex<HashMap<String, ReplyQueueEntry>>,
    max_reply_chars: usize,
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
        }
    }

    /// Override the reply length limit.
    pub fn with_max_reply_chars(mut self, max: usize) -> Self {
        self.max_reply_chars = max;
        self
    }

    /// Insert an entry as-is, bypassing validation. Test seeding only.
    pub fn insert_raw(&self, entry: ReplyQueueEntry) -> Result<()> {
        self.lock()?.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ReplyQueueEntry>>> {
        self.entries.lock().map_err(|e| ReplyError::Storage(e.to_string()))
    }

    /// Apply `f` to the entry if it is currently in `from`.
    fn transition(
        &self,
        id: &str,
        from: EntryStatus,
        to: EntryStatus,
        f: impl FnOnce(&mut ReplyQueueEntry),
    ) -> Result<ReplyQueueEntry> {
        let mut entries = self.lock()?;
        match entries.get_mut(id) {
            Some(entry) if entry.status == from => {
                f(entry);
                Ok(entry.clone())
            }
            Some(entry) => Err(transition_error(id, Some(entry.status), to)),
            None => Err(transition_error(id, None, to)),
        }
    }
}

impl ReplyQueueStore for MemoryQueueStore {
    fn enqueue(&self, new: NewReplyEntry, now: DateTime<Utc>) -> Result<Enqueued> {
        new.validate(now, self.max_reply_chars).map_err(ReplyError::Validation)?;

        let mut entries = self.lock()?;
        let open = entries.values().find(|e| {
            !e.status.is_terminal() && e.owner_user_id == new.owner_user_id && e.source_post_ref == new.source_post_ref
        });
        if let Some(existing) = open {
            return Ok(Enqueued::Existing(existing.clone()));
        }

        let entry = ReplyQueueEntry::from_new(new, now);
        entries.insert(entry.id.clone(), entry.clone());
        Ok(Enqueued::Created(entry))
    }

    fn get(&self, id: &str) -> Result<Option<ReplyQueueEntry>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ReplyQueueEntry>> {
        let entries = self.lock()?;
        let mut due: Vec<ReplyQueueEntry> = entries.values().filter(|e| e.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then_with(|| a.created_at.cmp(&b.created_at)));
        due.truncate(limit);
        Ok(due)
    }

    fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.lock()?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| ReplyError::EntryNotFound(id.to_string()))?;
        Ok(entry.claim(now))
    }

    fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>, external_id: Option<&str>) -> Result<ReplyQueueEntry> {
        self.transition(id, EntryStatus::InFlight, EntryStatus::Sent, |e| {
            e.resolve_sent(sent_at, external_id)
        })
    }

    fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<ReplyQueueEntry> {
        self.transition(id, EntryStatus::InFlight, EntryStatus::Failed, |e| {
            e.resolve_failed(error, now)
        })
    }

    fn requeue(
        &self,
        id: &str,
        scheduled_for: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ReplyQueueEntry> {
        self.transition(id, EntryStatus::InFlight, EntryStatus::Pending, |e| {
            e.resolve_requeued(scheduled_for, error, now)
        })
    }

    fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<ReplyQueueEntry> {
        self.transition(id, EntryStatus::Pending, EntryStatus::Cancelled, |e| {
            e.resolve_cancelled(now)
        })
    }

    fn list(&self, status: Option<EntryStatus>, limit: usize) -> Result<Vec<ReplyQueueEntry>> {
        let entries = self.lock()?;
        let mut out: Vec<ReplyQueueEntry> = entries
            .values()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    fn count_by_status(&self) -> Result<BTreeMap<EntryStatus, usize>> {
        let entries = self.lock()?;
        let mut counts = empty_counts();
        for entry in entries.values() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn activity_since(
        &self,
        owner: &str,
        target: Option<&str>,
        since: DateTime<Utc>,
        include_pending: bool,
    ) -> Result<Vec<DateTime<Utc>>> {
        let entries = self.lock()?;
        let mut times: Vec<DateTime<Utc>> = entries
            .values()
            .filter(|e| e.owner_user_id == owner)
            .filter(|e| target.is_none_or(|t| e.target_account_ref == t))
            .filter(|e| counts_as_activity(e.status, include_pending))
            .map(|e| e.activity_at())
            .filter(|at| *at >= since)
            .collect();
        times.sort();
        Ok(times)
    }

    fn has_source(&self, owner: &str, source_post_ref: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .values()
            .any(|e| e.owner_user_id == owner && e.source_post_ref == source_post_ref))
    }

    fn list_stale_in_flight(&self, claimed_before: DateTime<Utc>) -> Result<Vec<ReplyQueueEntry>> {
        let entries = self.lock()?;
        let mut stale: Vec<ReplyQueueEntry> = entries
            .values()
            .filter(|e| e.status == EntryStatus::InFlight && e.updated_at < claimed_before)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(stale)
    }
}

/// In-memory settings keyed by owner.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<HashMap<String, AutopilotSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace settings for a user.
    pub fn upsert(&self, settings: AutopilotSettings) -> Result<()> {
        self.settings
            .lock()
            .map_err(|e| ReplyError::Storage(e.to_string()))?
            .insert(settings.owner_user_id.clone(), settings);
        Ok(())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_settings(&self, owner_user_id: &str) -> Result<Option<AutopilotSettings>> {
        Ok(self
            .settings
            .lock()
            .map_err(|e| ReplyError::Storage(e.to_string()))?
            .get(owner_user_id)
            .cloned())
    }

    fn list_enabled(&self) -> Result<Vec<AutopilotSettings>> {
        let settings = self.settings.lock().map_err(|e| ReplyError::Storage(e.to_string()))?;
        let mut enabled: Vec<AutopilotSettings> = settings.values().filter(|s| s.is_enabled).cloned().collect();
        enabled.sort_by(|a, b| a.owner_user_id.cmp(&b.owner_user_id));
        Ok(enabled)
    }
}
