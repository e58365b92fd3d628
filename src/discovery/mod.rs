//! Candidate post discovery ("tweet processing").
//!
//! For every user with autopilot enabled: fetch recent posts from the
//! monitored accounts, gate them through the policy and rate limits,
//! generate reply text, and enqueue it at the planned time.

mod http;
mod pipeline;
mod source;

pub use http::{HttpPostSource, HttpSourceConfig};
pub use pipeline::{DiscoveryConfig, DiscoveryPipeline};
pub use source::{PostSource, SourceError};
