//! Error types for wire-shape validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, RecordError>;

/// Errors raised when a backend row fails boundary validation.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The row is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is missing.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The `id` field is not a parseable record ID.
    #[error("invalid record id: {0}")]
    InvalidId(String),

    /// The `updatedAt` field is not an integer timestamp.
    #[error("invalid `updatedAt` timestamp")]
    InvalidTimestamp,

    /// The `deleted` marker is present but not a boolean.
    #[error("invalid `deleted` marker")]
    InvalidDeletedMarker,
}
