//! Replypilot - scheduled, rate-limited reply posting
//!
//! Replies are queued with a send time chosen by the rate limiter, then
//! claimed and posted by a periodic scheduler. Claims are atomic in the
//! store, so a reply is posted at most once even with concurrent workers.

pub mod autopilot;
pub mod clock;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod executor;
pub mod generation;
pub mod id;
pub mod posting;
pub mod rate_limit;
pub mod recovery;
pub mod scheduler;
pub mod store;

pub use error::{ReplyError, Result};
