//! The local record envelope.

use rosterbase_protocol::{RecordId, RemoteRecord, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A synced record as held in the local store.
///
/// In addition to its domain fields, every record carries the sync
/// metadata that drives reconciliation:
///
/// - `dirty`: this copy has local mutations not yet acknowledged by the
///   backend
/// - `tombstoned`: the record was deleted locally or remotely; the marker
///   is retained (not physically removed) until the deletion has been
///   acknowledged, so a concurrent pull cannot resurrect the record
///
/// Only the [`ChangeTracker`](crate::ChangeTracker) writes `dirty` and
/// `updated_at`; everything else treats them as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Stable record identifier.
    pub id: RecordId,
    /// Ordering key for last-writer-wins resolution.
    pub updated_at: Timestamp,
    /// True if this copy has unacknowledged local mutations.
    pub dirty: bool,
    /// True if the record is deleted but the deletion is not yet final.
    pub tombstoned: bool,
    /// Domain fields, opaque to the sync layer.
    pub fields: Map<String, Value>,
}

impl StoredRecord {
    /// Builds a clean local copy of a validated remote row.
    #[must_use]
    pub fn from_remote(remote: RemoteRecord) -> Self {
        Self {
            id: remote.id,
            updated_at: remote.updated_at,
            dirty: false,
            tombstoned: remote.deleted,
            fields: remote.fields,
        }
    }

    /// Converts the record to its wire shape.
    ///
    /// A tombstone becomes a deletion row; live records carry their
    /// domain fields.
    #[must_use]
    pub fn to_remote(&self) -> RemoteRecord {
        if self.tombstoned {
            RemoteRecord::deletion(self.id, self.updated_at)
        } else {
            RemoteRecord::new(self.id, self.updated_at, self.fields.clone())
        }
    }
}
