//! Domain types for replypilot
//!
//! - ReplyQueueEntry: a persisted intent to send one reply, with its status machine
//! - AutopilotSettings: per-user gate configuration
//! - CandidatePost: a monitored post that may be replied to

pub mod entry;
pub mod post;
pub mod settings;

pub use entry::{EntryStatus, Enqueued, MAX_ERROR_CHARS, NewReplyEntry, ReplyQueueEntry, truncate_error};
pub use post::CandidatePost;
pub use settings::AutopilotSettings;
