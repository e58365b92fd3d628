//! Error types for replypilot
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::EntryStatus;

/// All error types that can occur in the reply queue core
#[derive(Debug, Error)]
pub enum ReplyError {
    /// Malformed enqueue input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Queue entry not found in storage
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Attempted a transition the entry lifecycle does not allow
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: EntryStatus,
        to: EntryStatus,
    },

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// External collaborator error that is not a classified posting failure
    #[error("External error: {0}")]
    External(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for replypilot operations
pub type Result<T> = std::result::Result<T, ReplyError>;
