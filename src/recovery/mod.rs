//! Startup recovery for entries left mid-send by a crashed process.
//!
//! An entry stuck in `in_flight` may or may not have been posted. Sends
//! are at-most-once, so such entries are failed rather than retried.

mod stale;

pub use stale::{INTERRUPTED_ERROR, RecoveryResult, RecoveryStats, recover_stale_claims};
