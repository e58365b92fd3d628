//! Storage layer for replypilot.
//!
//! Two interchangeable implementations of the queue contract:
//! - **MemoryQueueStore**: mutex-guarded map, used by tests and dry runs
//! - **SqliteQueueStore**: rusqlite database, used by the daemon
//!
//! # Example
//!
//! ```ignore
//! use replypilot::store::{ReplyQueueStore, SqliteQueueStore};
//!
//! let store = SqliteQueueStore::open("/tmp/replypilot.db")?;
//! let entry = store.enqueue(new_entry, now)?.into_entry();
//! if store.claim(&entry.id, now)? {
//!     store.mark_sent(&entry.id, now, Some("1890"))?;
//! }
//! ```

mod memory;
mod sqlite;
mod traits;

pub use memory::{MemoryQueueStore, MemorySettingsStore};
pub use sqlite::SqliteQueueStore;
pub use traits::{DEFAULT_MAX_REPLY_CHARS, ReplyQueueStore, SettingsStore};
