//! Per-phase and per-tick result summaries

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::EntryStatus;
use crate::recovery::RecoveryStats;

/// Counts from one run of a phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    /// Items looked at (due entries, or candidate posts)
    pub processed: usize,
    /// Replies sent, or entries enqueued
    pub succeeded: usize,
    pub requeued: usize,
    pub failed: usize,
    /// Lost claims, or posts filtered out
    pub skipped: usize,
    /// Messages for items that failed with an error
    pub errors: Vec<String>,
}

impl PhaseReport {
    /// Count a failure and keep its message.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }

    pub fn merge(&mut self, other: PhaseReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.requeued += other.requeued;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }
}

/// Result of a full tick: stale claim recovery, discovery, then reply processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub recovery: RecoveryStats,
    pub tweets: PhaseReport,
    pub replies: PhaseReport,
    /// Phase-level errors (the phase could not run at all)
    pub errors: Vec<String>,
}

impl TickReport {
    pub fn last_error(&self) -> Option<&str> {
        self.errors
            .last()
            .map(String::as_str)
            .or_else(|| self.replies.last_error())
            .or_else(|| self.tweets.last_error())
    }
}

/// Operator-facing snapshot of the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub counts_by_status: BTreeMap<EntryStatus, usize>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub tick_count: u64,
    /// Replies sent since the scheduler was created
    pub total_sent: u64,
    /// Replies failed since the scheduler was created
    pub total_failed: u64,
    pub last_error: Option<String>,
}
