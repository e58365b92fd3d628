//! SQLite-backed reply queue.
//!
//! Entries live in a single `reply_queue` table with one column per field,
//! so that state transitions can be expressed as conditional `UPDATE`s:
//! - `claim` is `UPDATE … WHERE id = ? AND status = 'pending'`, and the
//!   caller wins only if exactly one row changed
//! - a partial unique index on (owner, source post) over non-terminal rows
//!   backs idempotent enqueue even across processes sharing the file

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::traits::{
    DEFAULT_MAX_REPLY_CHARS, ReplyQueueStore, SettingsStore, counts_as_activity, empty_counts, transition_error,
};
use crate::domain::{
    AutopilotSettings, EntryStatus, Enqueued, NewReplyEntry, ReplyQueueEntry, truncate_error,
};
use crate::error::{ReplyError, Result};

const ENTRY_COLUMNS: &str = "id, owner_user_id, target_account_ref, source_post_ref, reply_text, \
     is_auto_generated, status, scheduled_for, sent_at, external_id, attempt_count, last_error, \
     created_at, updated_at";

/// SQLite reply queue and settings store.
///
/// rusqlite's `Connection` isn't `Sync`, so it sits behind a `Mutex`.
pub struct SqliteQueueStore {
    db: Mutex<Connection>,
    path: Option<PathBuf>,
    max_reply_chars: usize,
}

impl std::fmt::Debug for SqliteQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQueueStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteQueueStore {
    /// Open or create the database file at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        db.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Mutex::new(db),
            path: Some(path.to_path_buf()),
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Mutex::new(db),
            path: None,
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
        })
    }

    /// Override the reply length limit.
    pub fn with_max_reply_chars(mut self, max: usize) -> Self {
        self.max_reply_chars = max;
        self
    }

    /// Path of the database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.pragma_update(None, "journal_mode", "WAL")?;
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reply_queue (
                id TEXT PRIMARY KEY,
                owner_user_id TEXT NOT NULL,
                target_account_ref TEXT NOT NULL,
                source_post_ref TEXT NOT NULL,
                reply_text TEXT NOT NULL,
                is_auto_generated INTEGER NOT NULL,
                status TEXT NOT NULL,
                scheduled_for INTEGER NOT NULL,
                sent_at INTEGER,
                external_id TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reply_queue_due ON reply_queue(status, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_reply_queue_owner ON reply_queue(owner_user_id, status);
            CREATE INDEX IF NOT EXISTS idx_reply_queue_source ON reply_queue(owner_user_id, source_post_ref);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reply_queue_open_source
                ON reply_queue(owner_user_id, source_post_ref)
                WHERE status IN ('pending', 'in_flight');

            CREATE TABLE IF NOT EXISTS autopilot_settings (
                owner_user_id TEXT PRIMARY KEY,
                is_enabled INTEGER NOT NULL,
                max_tweet_age_minutes INTEGER NOT NULL,
                skip_retweets INTEGER NOT NULL,
                max_replies_per_window INTEGER
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| ReplyError::Storage(e.to_string()))
    }

    /// Insert or replace settings for a user.
    pub fn upsert_settings(&self, settings: &AutopilotSettings) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO autopilot_settings
            (owner_user_id, is_enabled, max_tweet_age_minutes, skip_retweets, max_replies_per_window)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(owner_user_id) DO UPDATE SET
                is_enabled = excluded.is_enabled,
                max_tweet_age_minutes = excluded.max_tweet_age_minutes,
                skip_retweets = excluded.skip_retweets,
                max_replies_per_window = excluded.max_replies_per_window
            "#,
            params![
                settings.owner_user_id,
                settings.is_enabled,
                settings.max_tweet_age_minutes,
                settings.skip_retweets,
                settings.max_replies_per_window,
            ],
        )?;
        Ok(())
    }

    fn current_status(db: &Connection, id: &str) -> Result<Option<EntryStatus>> {
        let status: Option<String> = db
            .query_row("SELECT status FROM reply_queue WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        status
            .map(|s| s.parse::<EntryStatus>().map_err(ReplyError::Storage))
            .transpose()
    }

    fn fetch(db: &Connection, id: &str) -> Result<Option<ReplyQueueEntry>> {
        let sql = format!("SELECT {} FROM reply_queue WHERE id = ?1", ENTRY_COLUMNS);
        Ok(db.query_row(&sql, [id], row_to_entry).optional()?)
    }

    fn find_open(db: &Connection, owner: &str, source_post_ref: &str) -> Result<Option<ReplyQueueEntry>> {
        let sql = format!(
            "SELECT {} FROM reply_queue WHERE owner_user_id = ?1 AND source_post_ref = ?2 \
             AND status IN ('pending', 'in_flight') LIMIT 1",
            ENTRY_COLUMNS
        );
        Ok(db.query_row(&sql, params![owner, source_post_ref], row_to_entry).optional()?)
    }

    fn insert(db: &Connection, entry: &ReplyQueueEntry) -> Result<()> {
        db.execute(
            &format!(
                "INSERT INTO reply_queue ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                ENTRY_COLUMNS
            ),
            params![
                entry.id,
                entry.owner_user_id,
                entry.target_account_ref,
                entry.source_post_ref,
                entry.reply_text,
                entry.is_auto_generated,
                entry.status.as_str(),
                entry.scheduled_for.timestamp_millis(),
                entry.sent_at.map(|t| t.timestamp_millis()),
                entry.external_id,
                entry.attempt_count,
                entry.last_error,
                entry.created_at.timestamp_millis(),
                entry.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Run a conditional update and return the updated row, or the reason it did not apply.
    fn transition(
        &self,
        id: &str,
        to: EntryStatus,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<ReplyQueueEntry> {
        let db = self.conn()?;
        let changed = db.execute(sql, params)?;
        if changed == 0 {
            return Err(transition_error(id, Self::current_status(&db, id)?, to));
        }
        Self::fetch(&db, id)?.ok_or_else(|| ReplyError::EntryNotFound(id.to_string()))
    }

    fn query_entries(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<ReplyQueueEntry>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

impl ReplyQueueStore for SqliteQueueStore {
    fn enqueue(&self, new: NewReplyEntry, now: DateTime<Utc>) -> Result<Enqueued> {
        new.validate(now, self.max_reply_chars).map_err(ReplyError::Validation)?;

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = Self::find_open(&tx, &new.owner_user_id, &new.source_post_ref)? {
            return Ok(Enqueued::Existing(existing));
        }

        let entry = ReplyQueueEntry::from_new(new, now);
        Self::insert(&tx, &entry)?;
        tx.commit()?;

        tracing::debug!(entry_id = %entry.id, owner = %entry.owner_user_id, "Enqueued reply");
        Ok(Enqueued::Created(entry))
    }

    fn get(&self, id: &str) -> Result<Option<ReplyQueueEntry>> {
        let db = self.conn()?;
        Self::fetch(&db, id)
    }

    fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ReplyQueueEntry>> {
        let sql = format!(
            "SELECT {} FROM reply_queue WHERE status = 'pending' AND scheduled_for <= ?1 \
             ORDER BY scheduled_for ASC, created_at ASC LIMIT ?2",
            ENTRY_COLUMNS
        );
        self.query_entries(&sql, params![now.timestamp_millis(), limit as i64])
    }

    fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let db = self.conn()?;
        let changed = db.execute(
            "UPDATE reply_queue SET status = 'in_flight', updated_at = ?2 WHERE id = ?1 AND status = 'pending'",
            params![id, now.timestamp_millis()],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        match Self::current_status(&db, id)? {
            Some(_) => Ok(false),
            None => Err(ReplyError::EntryNotFound(id.to_string())),
        }
    }

    fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>, external_id: Option<&str>) -> Result<ReplyQueueEntry> {
        let ts = sent_at.timestamp_millis();
        self.transition(
            id,
            EntryStatus::Sent,
            "UPDATE reply_queue SET status = 'sent', sent_at = ?2, external_id = ?3, \
             attempt_count = attempt_count + 1, last_error = NULL, updated_at = ?2 \
             WHERE id = ?1 AND status = 'in_flight'",
            params![id, ts, external_id],
        )
    }

    fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<ReplyQueueEntry> {
        let error = truncate_error(error);
        self.transition(
            id,
            EntryStatus::Failed,
            "UPDATE reply_queue SET status = 'failed', last_error = ?2, \
             attempt_count = attempt_count + 1, updated_at = ?3 \
             WHERE id = ?1 AND status = 'in_flight'",
            params![id, error, now.timestamp_millis()],
        )
    }

    fn requeue(
        &self,
        id: &str,
        scheduled_for: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ReplyQueueEntry> {
        let error = truncate_error(error);
        self.transition(
            id,
            EntryStatus::Pending,
            "UPDATE reply_queue SET status = 'pending', scheduled_for = MAX(?2, created_at), \
             last_error = ?3, attempt_count = attempt_count + 1, updated_at = ?4 \
             WHERE id = ?1 AND status = 'in_flight'",
            params![id, scheduled_for.timestamp_millis(), error, now.timestamp_millis()],
        )
    }

    fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<ReplyQueueEntry> {
        self.transition(
            id,
            EntryStatus::Cancelled,
            "UPDATE reply_queue SET status = 'cancelled', updated_at = ?2 WHERE id = ?1 AND status = 'pending'",
            params![id, now.timestamp_millis()],
        )
    }

    fn list(&self, status: Option<EntryStatus>, limit: usize) -> Result<Vec<ReplyQueueEntry>> {
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM reply_queue WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
                    ENTRY_COLUMNS
                );
                self.query_entries(&sql, params![status.as_str(), limit as i64])
            }
            None => {
                let sql = format!("SELECT {} FROM reply_queue ORDER BY created_at DESC LIMIT ?1", ENTRY_COLUMNS);
                self.query_entries(&sql, params![limit as i64])
            }
        }
    }

    fn count_by_status(&self) -> Result<BTreeMap<EntryStatus, usize>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT status, COUNT(*) FROM reply_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = empty_counts();
        for row in rows {
            let (status, count) = row?;
            let status = status.parse::<EntryStatus>().map_err(ReplyError::Storage)?;
            counts.insert(status, count as usize);
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
        // Same timestamp rule as ReplyQueueEntry::activity_at, applied in SQL so rows outside the window are never loaded.
        let sql = format!(
            "SELECT {} FROM reply_queue WHERE owner_user_id = ?1 \
             AND (?2 IS NULL OR target_account_ref = ?2) \
             AND (status IN ('sent', 'in_flight') OR (?4 AND status = 'pending')) \
             AND CASE status \
                 WHEN 'sent' THEN COALESCE(sent_at, updated_at) \
                 WHEN 'in_flight' THEN updated_at \
                 ELSE scheduled_for END >= ?3",
            ENTRY_COLUMNS
        );
        let entries = self.query_entries(
            &sql,
            params![owner, target, since.timestamp_millis(), include_pending],
        )?;

        let mut times: Vec<DateTime<Utc>> = entries
            .iter()
            .filter(|e| counts_as_activity(e.status, include_pending))
            .map(|e| e.activity_at())
            .filter(|at| *at >= since)
            .collect();
        times.sort();
        Ok(times)
    }

    fn has_source(&self, owner: &str, source_post_ref: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM reply_queue WHERE owner_user_id = ?1 AND source_post_ref = ?2 LIMIT 1",
                params![owner, source_post_ref],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_stale_in_flight(&self, claimed_before: DateTime<Utc>) -> Result<Vec<ReplyQueueEntry>> {
        let sql = format!(
            "SELECT {} FROM reply_queue WHERE status = 'in_flight' AND updated_at < ?1 ORDER BY updated_at ASC",
            ENTRY_COLUMNS
        );
        self.query_entries(&sql, params![claimed_before.timestamp_millis()])
    }
}

impl SettingsStore for SqliteQueueStore {
    fn get_settings(&self, owner_user_id: &str) -> Result<Option<AutopilotSettings>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT owner_user_id, is_enabled, max_tweet_age_minutes, skip_retweets, max_replies_per_window \
                 FROM autopilot_settings WHERE owner_user_id = ?1",
                [owner_user_id],
                row_to_settings,
            )
            .optional()?)
    }

    fn list_enabled(&self) -> Result<Vec<AutopilotSettings>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT owner_user_id, is_enabled, max_tweet_age_minutes, skip_retweets, max_replies_per_window \
             FROM autopilot_settings WHERE is_enabled = 1 ORDER BY owner_user_id",
        )?;
        let rows = stmt.query_map([], row_to_settings)?;

        let mut settings = Vec::new();
        for row in rows {
            settings.push(row?);
        }
        Ok(settings)
    }
}

fn row_to_settings(row: &Row<'_>) -> rusqlite::Result<AutopilotSettings> {
    Ok(AutopilotSettings {
        owner_user_id: row.get(0)?,
        is_enabled: row.get(1)?,
        max_tweet_age_minutes: row.get(2)?,
        skip_retweets: row.get(3)?,
        max_replies_per_window: row.get(4)?,
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ReplyQueueEntry> {
    let status: String = row.get(6)?;
    let status = status
        .parse::<EntryStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;

    Ok(ReplyQueueEntry {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        target_account_ref: row.get(2)?,
        source_post_ref: row.get(3)?,
        reply_text: row.get(4)?,
        is_auto_generated: row.get(5)?,
        status,
        scheduled_for: millis_column(row, 7)?,
        sent_at: row
            .get::<_, Option<i64>>(8)?
            .map(|ms| millis_to_datetime(8, ms))
            .transpose()?,
        external_id: row.get(9)?,
        attempt_count: row.get(10)?,
        last_error: row.get(11)?,
        created_at: millis_column(row, 12)?,
        updated_at: millis_column(row, 13)?,
    })
}

fn millis_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    millis_to_datetime(idx, row.get(idx)?)
}

fn millis_to_datetime(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, format!("timestamp out of range: {}", ms).into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_entry(source: &str, delay_secs: i64) -> NewReplyEntry {
        NewReplyEntry::auto("user-1", "@target", source, "Great point", now() + Duration::seconds(delay_secs))
    }

    fn create_temp_store() -> (SqliteQueueStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteQueueStore::open(temp_dir.path().join("queue.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("queue.db");
        let store = SqliteQueueStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_enqueue_and_get_roundtrip() {
        let (store, _temp) = create_temp_store();
        let entry = store.enqueue(new_entry("p1", 90), now()).unwrap().into_entry();

        let loaded = store.get(&entry.id).unwrap().unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let (store, _temp) = create_temp_store();
        let first = store.enqueue(new_entry("p1", 60), now()).unwrap();
        let second = store.enqueue(new_entry("p1", 600), now()).unwrap();
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.entry().id, second.entry().id);
        assert_eq!(store.count_by_status().unwrap()[&EntryStatus::Pending], 1);
    }

    #[test]
    fn test_enqueue_rejects_invalid() {
        let (store, _temp) = create_temp_store();
        let mut new = new_entry("p1", 0);
        new.owner_user_id = String::new();
        assert!(matches!(store.enqueue(new, now()), Err(ReplyError::Validation(_))));
    }

    #[test]
    fn test_list_due_never_returns_future() {
        let (store, _temp) = create_temp_store();
        store.enqueue(new_entry("future", 3600), now()).unwrap();
        store.enqueue(new_entry("b", 20), now()).unwrap();
        store.enqueue(new_entry("a", 10), now()).unwrap();

        let at = now() + Duration::seconds(30);
        let due = store.list_due(at, 10).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].source_post_ref, "a");
        assert_eq!(due[1].source_post_ref, "b");
        assert!(due.iter().all(|e| e.scheduled_for <= at));
    }

    #[test]
    fn test_claim_is_conditional() {
        let (store, _temp) = create_temp_store();
        let entry = store.enqueue(new_entry("p1", 0), now()).unwrap().into_entry();
        assert!(store.claim(&entry.id, now()).unwrap());
        assert!(!store.claim(&entry.id, now()).unwrap());
        assert!(matches!(store.claim("missing", now()), Err(ReplyError::EntryNotFound(_))));
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let (store, _temp) = create_temp_store();
        let store = Arc::new(store);
        let entry = store.enqueue(new_entry("p1", 0), now()).unwrap().into_entry();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let id = entry.id.clone();
                std::thread::spawn(move || store.claim(&id, now()).unwrap())
            })
            .collect();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_two_connections_single_winner() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.db");
        let a = SqliteQueueStore::open(&path).unwrap();
        let b = SqliteQueueStore::open(&path).unwrap();

        let entry = a.enqueue(new_entry("p1", 0), now()).unwrap().into_entry();
        let won_a = a.claim(&entry.id, now()).unwrap();
        let won_b = b.claim(&entry.id, now()).unwrap();
        assert!(won_a ^ won_b);
    }

    #[test]
    fn test_mark_sent_and_failed() {
        let (store, _temp) = create_temp_store();
        let a = store.enqueue(new_entry("a", 0), now()).unwrap().into_entry();
        let b = store.enqueue(new_entry("b", 0), now()).unwrap().into_entry();
        store.claim(&a.id, now()).unwrap();
        store.claim(&b.id, now()).unwrap();

        let sent = store.mark_sent(&a.id, now() + Duration::seconds(2), Some("ext-1")).unwrap();
        assert_eq!(sent.status, EntryStatus::Sent);
        assert_eq!(sent.sent_at, Some(now() + Duration::seconds(2)));
        assert_eq!(sent.external_id.as_deref(), Some("ext-1"));
        assert_eq!(sent.attempt_count, 1);

        let failed = store.mark_failed(&b.id, &"x".repeat(4000), now()).unwrap();
        assert_eq!(failed.status, EntryStatus::Failed);
        assert!(failed.sent_at.is_none());
        assert_eq!(failed.last_error.unwrap().chars().count(), crate::domain::MAX_ERROR_CHARS);
    }

    #[test]
    fn test_invalid_transitions() {
        let (store, _temp) = create_temp_store();
        let entry = store.enqueue(new_entry("p1", 0), now()).unwrap().into_entry();

        assert!(matches!(
            store.mark_sent(&entry.id, now(), None),
            Err(ReplyError::InvalidTransition {
                from: EntryStatus::Pending,
                to: EntryStatus::Sent,
                ..
            })
        ));
        assert!(matches!(
            store.mark_failed("missing", "x", now()),
            Err(ReplyError::EntryNotFound(_))
        ));

        store.cancel(&entry.id, now()).unwrap();
        assert!(store.cancel(&entry.id, now()).is_err());
        assert!(!store.claim(&entry.id, now()).unwrap());
    }

    #[test]
    fn test_requeue_increments_attempts() {
        let (store, _temp) = create_temp_store();
        let entry = store.enqueue(new_entry("p1", 0), now()).unwrap().into_entry();
        store.claim(&entry.id, now()).unwrap();

        let later = now() + Duration::minutes(2);
        let requeued = store.requeue(&entry.id, later, "timeout", now()).unwrap();
        assert_eq!(requeued.status, EntryStatus::Pending);
        assert_eq!(requeued.attempt_count, 1);
        assert_eq!(requeued.scheduled_for, later);
        assert_eq!(requeued.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_open_source_unique_after_requeue() {
        let (store, _temp) = create_temp_store();
        let entry = store.enqueue(new_entry("p1", 0), now()).unwrap().into_entry();
        store.claim(&entry.id, now()).unwrap();
        let again = store.enqueue(new_entry("p1", 0), now()).unwrap();
        assert_eq!(again.entry().id, entry.id);
    }

    #[test]
    fn test_activity_since_rules() {
        let (store, _temp) = create_temp_store();
        let sent = store.enqueue(new_entry("a", 0), now()).unwrap().into_entry();
        let flying = store.enqueue(new_entry("b", 0), now()).unwrap().into_entry();
        store.enqueue(new_entry("c", 0), now()).unwrap();
        let failed = store.enqueue(new_entry("d", 0), now()).unwrap().into_entry();

        store.claim(&sent.id, now()).unwrap();
        store.mark_sent(&sent.id, now(), None).unwrap();
        store.claim(&flying.id, now()).unwrap();
        store.claim(&failed.id, now()).unwrap();
        store.mark_failed(&failed.id, "nope", now()).unwrap();

        let since = now() - Duration::minutes(5);
        assert_eq!(store.activity_since("user-1", None, since, false).unwrap().len(), 2);
        assert_eq!(store.activity_since("user-1", None, since, true).unwrap().len(), 3);
        assert_eq!(store.activity_since("user-1", Some("@target"), since, false).unwrap().len(), 2);
        assert!(store.activity_since("user-1", None, now() + Duration::minutes(1), false).unwrap().is_empty());
    }

    #[test]
    fn test_activity_since_excludes_old_rows_per_status() {
        let (store, _temp) = create_temp_store();
        let old = now() - Duration::hours(30);
        let stale_sent = store.enqueue(new_entry("a", 0), old).unwrap().into_entry();
        store.claim(&stale_sent.id, old).unwrap();
        store.mark_sent(&stale_sent.id, old, None).unwrap();

        // Created long ago but sent recently: counts at its send time
        let late_sent = store.enqueue(new_entry("b", 0), old).unwrap().into_entry();
        store.claim(&late_sent.id, now()).unwrap();
        store.mark_sent(&late_sent.id, now(), None).unwrap();

        let since = now() - Duration::hours(24);
        let times = store.activity_since("user-1", None, since, false).unwrap();
        assert_eq!(times, vec![now()]);
        assert_eq!(store.activity_since("user-1", None, old, false).unwrap().len(), 2);
    }

    #[test]
    fn test_list_and_counts() {
        let (store, _temp) = create_temp_store();
        let a = store.enqueue(new_entry("a", 0), now()).unwrap().into_entry();
        store.enqueue(new_entry("c", 5), now()).unwrap();
        store.cancel(&a.id, now()).unwrap();

        assert_eq!(store.list(None, 10).unwrap().len(), 2);
        assert_eq!(store.list(Some(EntryStatus::Cancelled), 10).unwrap().len(), 1);
        let counts = store.count_by_status().unwrap();
        assert_eq!(counts[&EntryStatus::Cancelled], 1);
        assert_eq!(counts[&EntryStatus::Pending], 1);
        assert_eq!(counts[&EntryStatus::Sent], 0);
    }

    #[test]
    fn test_has_source_and_stale() {
        let (store, _temp) = create_temp_store();
        let a = store.enqueue(new_entry("a", 0), now()).unwrap().into_entry();
        store.claim(&a.id, now()).unwrap();

        assert!(store.has_source("user-1", "a").unwrap());
        assert!(!store.has_source("user-2", "a").unwrap());
        assert!(store.list_stale_in_flight(now()).unwrap().is_empty());
        assert_eq!(store.list_stale_in_flight(now() + Duration::seconds(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.db");
        let id = {
            let store = SqliteQueueStore::open(&path).unwrap();
            store.enqueue(new_entry("p1", 0), now()).unwrap().into_entry().id
        };
        let store = SqliteQueueStore::open(&path).unwrap();
        assert!(store.get(&id).unwrap().is_some());
    }

    #[test]
    fn test_settings_roundtrip() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        store.upsert_settings(&AutopilotSettings::enabled("a").with_window_limit(4)).unwrap();
        store.upsert_settings(&AutopilotSettings::enabled("b").disabled()).unwrap();

        let a = store.get_settings("a").unwrap().unwrap();
        assert_eq!(a.max_replies_per_window, Some(4));
        let enabled = store.list_enabled().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].owner_user_id, "a");

        store.upsert_settings(&AutopilotSettings::enabled("b")).unwrap();
        assert_eq!(store.list_enabled().unwrap().len(), 2);
    }
}
