//! Error types for the sync engine.

use rosterbase_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or timeout failure. Safe to retry on the next cycle; no
    /// data is lost.
    #[error("transient sync error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// The backend rejected a payload as invalid. Not retried
    /// automatically.
    #[error("permanent sync error: {message}")]
    Permanent {
        /// Description of the rejection.
        message: String,
    },

    /// Local store error during sync.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A sync cycle is already running.
    #[error("a sync cycle is already running")]
    CycleInProgress,
}

impl SyncError {
    /// Creates a transient (retryable) error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a permanent (non-retryable) error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Returns true if the failed operation can be retried automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }
}
