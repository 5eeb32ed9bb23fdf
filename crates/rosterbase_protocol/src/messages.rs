//! Push and pull message types.

use crate::record::RemoteRecord;
use crate::types::{Cursor, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// Acknowledgement for a single accepted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushAck {
    /// The accepted record.
    pub id: RecordId,
    /// The authoritative timestamp, present when the backend re-stamps
    /// on write. Absent means the locally-stamped value stands.
    #[serde(
        rename = "updatedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Timestamp>,
}

impl PushAck {
    /// Creates an acknowledgement that keeps the pushed timestamp.
    #[must_use]
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            updated_at: None,
        }
    }

    /// Creates an acknowledgement carrying a server-assigned timestamp.
    #[must_use]
    pub fn restamped(id: RecordId, updated_at: Timestamp) -> Self {
        Self {
            id,
            updated_at: Some(updated_at),
        }
    }
}

/// A record the backend refused to accept.
///
/// Rejections are per-record and permanent: the record stays dirty but is
/// excluded from automatic retry until its data changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRejection {
    /// The rejected record.
    pub id: RecordId,
    /// Human-readable rejection reason for surfacing to the UI.
    pub reason: String,
}

impl PushRejection {
    /// Creates a rejection.
    pub fn new(id: RecordId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Outcome of pushing a batch of records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushOutcome {
    /// Records the backend accepted.
    pub accepted: Vec<PushAck>,
    /// Records the backend rejected, with reasons.
    pub rejected: Vec<PushRejection>,
}

impl PushOutcome {
    /// Creates an outcome accepting every given record as-is.
    #[must_use]
    pub fn accepted_all<I: IntoIterator<Item = RecordId>>(ids: I) -> Self {
        Self {
            accepted: ids.into_iter().map(PushAck::new).collect(),
            rejected: Vec::new(),
        }
    }

    /// Returns true if nothing was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// One page of remote changes for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullPage {
    /// Created or updated records, in change order.
    pub records: Vec<RemoteRecord>,
    /// Records deleted on the backend since the cursor.
    #[serde(rename = "deletedIds")]
    pub deleted_ids: Vec<RecordId>,
    /// Watermark to resume from after this page is merged.
    #[serde(rename = "nextCursor")]
    pub next_cursor: Cursor,
}

impl PullPage {
    /// Creates an empty page that leaves the cursor where it was.
    #[must_use]
    pub fn empty(cursor: Cursor) -> Self {
        Self {
            records: Vec::new(),
            deleted_ids: Vec::new(),
            next_cursor: cursor,
        }
    }

    /// Total number of changes (upserts plus deletions) on this page.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.records.len() + self.deleted_ids.len()
    }
}
