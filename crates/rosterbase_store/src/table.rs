//! Per-table state and the persisted snapshot shape.

use crate::error::{StoreError, StoreResult};
use crate::record::StoredRecord;
use rosterbase_protocol::{Cursor, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot format version; bumped on incompatible layout changes.
const SNAPSHOT_VERSION: u32 = 1;

/// One table's records plus its pull watermark.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TableState {
    /// Records keyed by ID, tombstones included.
    pub records: BTreeMap<RecordId, StoredRecord>,
    /// Watermark up to which remote changes have been merged.
    pub cursor: Cursor,
}

/// The full persisted state of a local store.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    version: u32,
    pub tables: BTreeMap<String, TableState>,
}

impl Snapshot {
    pub fn new(tables: BTreeMap<String, TableState>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tables,
        }
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::invalid_snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterbase_protocol::Timestamp;
    use serde_json::Map;

    #[test]
    fn snapshot_roundtrip() {
        let mut records = BTreeMap::new();
        let id = RecordId::new();
        records.insert(
            id,
            StoredRecord {
                id,
                updated_at: Timestamp::from_millis(5),
                dirty: true,
                tombstoned: false,
                fields: Map::new(),
            },
        );

        let mut tables = BTreeMap::new();
        tables.insert(
            "teams".to_string(),
            TableState {
                records,
                cursor: Cursor::new(9),
            },
        );

        let snapshot = Snapshot::new(tables);
        let decoded = Snapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn unknown_version_rejected() {
        let bytes = br#"{"version": 99, "tables": {}}"#;
        assert!(matches!(
            Snapshot::decode(bytes),
            Err(StoreError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            Snapshot::decode(b"not json"),
            Err(StoreError::Codec(_))
        ));
    }
}
