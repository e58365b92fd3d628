//! Scheduler module: the background loop that drives replypilot.
//!
//! This module provides:
//! - **ReplyScheduler**: start/stop lifecycle, manual triggers, status
//! - **Tick bookkeeping**: configuration and counters carried between ticks
//! - **Reports**: what each phase did
//!
//! # Architecture
//!
//! The scheduler uses a polling model:
//! 1. Stale in-flight claims past their lease are failed
//! 2. Discovery enqueues replies for new candidate posts
//! 3. Due entries are listed in `scheduled_for` order
//! 4. Each entry is executed on a bounded worker pool
//! 5. The loop sleeps on the injected clock until the next tick
//!
//! # Example
//!
//! ```ignore
//! use replypilot::scheduler::{ReplyScheduler, SchedulerConfig};
//!
//! let scheduler = ReplyScheduler::new(store, executor, Some(discovery), clock, SchedulerConfig::default());
//! scheduler.start()?;
//! // ...
//! scheduler.stop().await?;
//! ```

mod report;
mod service;
mod tick;

pub use report::{PhaseReport, SchedulerStatus, TickReport};
pub use service::ReplyScheduler;
pub use tick::{SchedulerConfig, TickState};
