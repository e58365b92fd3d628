//! Per-user eligibility gate for candidate posts.

mod policy;

pub use policy::{AutopilotPolicy, PolicyDecision};
