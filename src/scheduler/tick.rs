//! Scheduler tick configuration and bookkeeping
//!
//! Each tick:
//! - Runs discovery (tweet processing) for enabled users
//! - Executes due queue entries on a bounded worker pool

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Configuration for the scheduler tick loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Interval between ticks
    pub tick_interval: Duration,
    /// Maximum due entries taken per tick
    pub batch_limit: usize,
    /// Maximum sends in flight at once
    pub worker_concurrency: usize,
    /// In-flight entries older than this are failed by recovery
    pub stale_claim_lease: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            batch_limit: 50,
            worker_concurrency: 4,
            stale_claim_lease: Duration::from_secs(10 * 60),
        }
    }
}

impl SchedulerConfig {
    /// Create a new scheduler config
    pub fn new(tick_interval: Duration, worker_concurrency: usize) -> Self {
        Self {
            tick_interval,
            worker_concurrency,
            ..Default::default()
        }
    }

    /// Set the batch limit
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Set the stale claim lease
    pub fn with_stale_claim_lease(mut self, lease: Duration) -> Self {
        self.stale_claim_lease = lease;
        self
    }
}

/// Tick state tracks what's happening between ticks
#[derive(Debug, Default)]
pub struct TickState {
    /// Number of ticks since start
    pub tick_count: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Most recent error from any phase
    pub last_error: Option<String>,
    /// Replies sent this session
    pub total_sent: u64,
    /// Replies failed this session
    pub total_failed: u64,
}

impl TickState {
    /// Create a new tick state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick
    pub fn tick(&mut self, at: DateTime<Utc>) {
        self.tick_count += 1;
        self.last_tick_at = Some(at);
    }

    /// Record send results
    pub fn sent(&mut self, sent: usize, failed: usize) {
        self.total_sent += sent as u64;
        self.total_failed += failed as u64;
    }

    /// Remember the latest error, if any
    pub fn error(&mut self, error: Option<&str>) {
        if let Some(error) = error {
            self.last_error = Some(error.to_string());
        }
    }
}
