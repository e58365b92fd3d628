//! Reply scheduler service
//!
//! Owns the background tick loop. Ticks are serialized: a manual trigger
//! waits for a running tick and vice versa, so each due entry is seen by
//! at most one dispatch per process (the store's claim covers the rest).

use std::sync::{Arc, Mutex};

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::report::{PhaseReport, SchedulerStatus, TickReport};
use super::tick::{SchedulerConfig, TickState};
use crate::clock::Clock;
use crate::discovery::DiscoveryPipeline;
use crate::error::{ReplyError, Result};
use crate::executor::{ExecutionOutcome, ReplyExecutor};
use crate::recovery::{RecoveryResult, RecoveryStats, recover_stale_claims};
use crate::store::ReplyQueueStore;

/// Handle to the running tick loop
struct RunningLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn ReplyQueueStore>,
    executor: Arc<ReplyExecutor>,
    discovery: Option<Arc<DiscoveryPipeline>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: Mutex<TickState>,
    tick_lock: tokio::sync::Mutex<()>,
}

/// Periodic driver for discovery and reply execution.
pub struct ReplyScheduler {
    inner: Arc<Inner>,
    running: Mutex<Option<RunningLoop>>,
}

impl ReplyScheduler {
    /// Without `discovery`, tweet processing is a no-op.
    pub fn new(
        store: Arc<dyn ReplyQueueStore>,
        executor: Arc<ReplyExecutor>,
        discovery: Option<Arc<DiscoveryPipeline>>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                discovery,
                clock,
                config,
                state: Mutex::new(TickState::new()),
                tick_lock: tokio::sync::Mutex::new(()),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Start the tick loop. Returns false if it was already running.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<bool> {
        let mut running = self.lock_running()?;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Ok(false);
        }

        let (shutdown, rx) = watch::channel(false);
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.run_loop(rx).await });
        *running = Some(RunningLoop { shutdown, task });

        tracing::info!(
            tick_interval_secs = self.inner.config.tick_interval.as_secs(),
            "Scheduler started"
        );
        Ok(true)
    }

    /// Stop the tick loop and wait for the current tick to finish.
    /// Returns false if it was not running.
    pub async fn stop(&self) -> Result<bool> {
        let running = self.lock_running()?.take();
        let Some(running) = running else {
            return Ok(false);
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            tracing::error!(error = %e, "Scheduler loop ended abnormally");
        }
        tracing::info!("Scheduler stopped");
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .map(|r| r.as_ref().is_some_and(|r| !r.task.is_finished()))
            .unwrap_or(false)
    }

    /// Run discovery then reply processing now.
    pub async fn trigger_all(&self) -> TickReport {
        self.inner.tick().await
    }

    /// Execute due entries now.
    pub async fn trigger_reply_processing(&self) -> Result<PhaseReport> {
        let _guard = self.inner.tick_lock.lock().await;
        let result = self.inner.process_replies().await;
        self.inner.record_phase(&result);
        if let Ok(report) = &result {
            self.inner.record_sends(report);
        }
        result
    }

    /// Run discovery now.
    pub async fn trigger_tweet_processing(&self) -> Result<PhaseReport> {
        let _guard = self.inner.tick_lock.lock().await;
        let result = self.inner.process_tweets().await;
        self.inner.record_phase(&result);
        result
    }

    /// Fail entries left in flight longer than the configured lease.
    pub async fn recover(&self) -> Result<RecoveryStats> {
        let _guard = self.inner.tick_lock.lock().await;
        self.inner.recover_stale()
    }

    pub fn status(&self) -> Result<SchedulerStatus> {
        let counts_by_status = self.inner.store.count_by_status()?;
        let state = self
            .inner
            .state
            .lock()
            .map_err(|e| ReplyError::Storage(e.to_string()))?;

        Ok(SchedulerStatus {
            is_running: self.is_running(),
            counts_by_status,
            last_tick_at: state.last_tick_at,
            tick_count: state.tick_count,
            total_sent: state.total_sent,
            total_failed: state.total_failed,
            last_error: state.last_error.clone(),
        })
    }

    fn lock_running(&self) -> Result<std::sync::MutexGuard<'_, Option<RunningLoop>>> {
        self.running.lock().map_err(|e| ReplyError::Storage(e.to_string()))
    }
}

impl Inner {
    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.tick().await;
            tracing::debug!(
                sent = report.replies.succeeded,
                requeued = report.replies.requeued,
                failed = report.replies.failed,
                enqueued = report.tweets.succeeded,
                "Tick complete"
            );

            tokio::select! {
                _ = self.clock.sleep(self.config.tick_interval) => {}
                _ = shutdown.changed() => break,
            }
        }
    }

    /// One full tick. Phase errors are logged and recorded, never propagated.
    ///
    /// Claims stranded by a panicked worker or a failed resolve are failed
    /// first, once their lease has run out.
    async fn tick(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        match self.recover_stale() {
            Ok(stats) => {
                for result in &stats.results {
                    if let RecoveryResult::Failed { entry_id, error } = result {
                        report.errors.push(format!("recovery: {}: {}", entry_id, error));
                    }
                }
                report.recovery = stats;
            }
            Err(e) => {
                tracing::error!(error = %e, "Stale claim recovery failed");
                report.errors.push(format!("recovery: {}", e));
            }
        }

        match self.process_tweets().await {
            Ok(phase) => report.tweets = phase,
            Err(e) => {
                tracing::error!(error = %e, "Tweet processing failed");
                report.errors.push(format!("tweet processing: {}", e));
            }
        }

        match self.process_replies().await {
            Ok(phase) => report.replies = phase,
            Err(e) => {
                tracing::error!(error = %e, "Reply processing failed");
                report.errors.push(format!("reply processing: {}", e));
            }
        }

        if let Ok(mut state) = self.state.lock() {
            state.tick(self.clock.now());
            state.sent(report.replies.succeeded, report.replies.failed);
            state.error(report.last_error());
        }
        report
    }

    fn recover_stale(&self) -> Result<RecoveryStats> {
        recover_stale_claims(self.store.as_ref(), self.clock.now(), self.config.stale_claim_lease)
    }

    fn record_sends(&self, report: &PhaseReport) {
        if let Ok(mut state) = self.state.lock() {
            state.sent(report.succeeded, report.failed);
        }
    }

    fn record_phase(&self, result: &Result<PhaseReport>) {
        if let Ok(mut state) = self.state.lock() {
            match result {
                Ok(report) => state.error(report.last_error()),
                Err(e) => state.error(Some(&e.to_string())),
            }
        }
    }

    async fn process_tweets(&self) -> Result<PhaseReport> {
        match &self.discovery {
            Some(discovery) => discovery.run().await,
            None => Ok(PhaseReport::default()),
        }
    }

    /// Dispatch due entries in schedule order onto a bounded worker pool.
    async fn process_replies(&self) -> Result<PhaseReport> {
        let due = self.store.list_due(self.clock.now(), self.config.batch_limit)?;
        let mut report = PhaseReport::default();
        if due.is_empty() {
            return Ok(report);
        }

        let permits = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
        let mut workers = JoinSet::new();

        for entry in due {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ReplyError::External(format!("worker pool closed: {}", e)))?;
            let executor = self.executor.clone();
            workers.spawn(async move {
                let _permit = permit;
                let result = executor.execute(&entry).await;
                (entry.id, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            report.processed += 1;
            match joined {
                Ok((_, Ok(outcome))) => match outcome {
                    ExecutionOutcome::Sent { .. } => report.succeeded += 1,
                    ExecutionOutcome::Requeued { .. } => report.requeued += 1,
                    ExecutionOutcome::Failed { .. } => report.failed += 1,
                    ExecutionOutcome::Skipped => report.skipped += 1,
                },
                Ok((entry_id, Err(e))) => {
                    tracing::error!(entry_id = %entry_id, error = %e, "Reply execution failed");
                    report.record_error(format!("{}: {}", entry_id, e));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reply worker panicked");
                    report.record_error(format!("worker panicked: {}", e));
                }
            }
        }

        Ok(report)
    }
}
