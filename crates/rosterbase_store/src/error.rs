//! Error types for the store.

use rosterbase_protocol::{Cursor, RecordId};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from the storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot or record (de)serialization failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {id} in table {table}")]
    RecordNotFound {
        /// The table searched.
        table: String,
        /// The record ID that was not found.
        id: RecordId,
    },

    /// A merge attempted to move a table's cursor backwards.
    #[error("cursor regression on table {table}: {current} -> {attempted}")]
    CursorRegression {
        /// The table whose cursor was targeted.
        table: String,
        /// The currently persisted cursor.
        current: Cursor,
        /// The rejected new cursor.
        attempted: Cursor,
    },

    /// Another process holds the store's exclusive lock.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The persisted snapshot is unreadable or from an unknown version.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },

    /// An entity did not serialize to a JSON object.
    #[error("entity did not serialize to a JSON object")]
    InvalidEntity,
}

impl StoreError {
    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Creates a record-not-found error.
    pub fn record_not_found(table: impl Into<String>, id: RecordId) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            id,
        }
    }
}
