//! Reply pacing.
//!
//! - `RateLimitEvaluator`: rolling hourly/daily/per-target windows and send-time planning
//! - `BackoffPolicy`: retry spacing after transient send failures
//! - `JitterSource`: injectable randomness for both

mod backoff;
mod config;
mod evaluator;
mod jitter;

pub use backoff::BackoffPolicy;
pub use config::RateLimitConfig;
pub use evaluator::{DelayPlan, RateLimitCheck, RateLimitEvaluator, RateWindow, WindowCounts, WindowLimits};
pub use jitter::{FixedJitter, JitterSource, RandomJitter};
