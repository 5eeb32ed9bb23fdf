//! The local store facade.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use crate::record::StoredRecord;
use crate::table::{Snapshot, TableState};
use crate::tracker::{ChangeTracker, Clock, SystemClock};
use rosterbase_protocol::{
    Cursor, RecordId, RemoteRecord, Timestamp, FIELD_DELETED, FIELD_ID, FIELD_UPDATED_AT,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One reconciliation decision to apply during a pull merge.
///
/// The sync engine computes these; the store applies them. The store
/// stamps every applied record through the change tracker's remote path,
/// so a merge can never produce a dirty record.
#[derive(Debug, Clone)]
pub enum MergeOp {
    /// The remote version wins; the local copy becomes clean.
    Apply(RemoteRecord),
    /// A remote deletion is applied; the local copy becomes a clean
    /// tombstone, eligible for purge.
    Delete(RecordId),
}

/// One acknowledged push to fold back into the store.
#[derive(Debug, Clone)]
pub struct AckedPush {
    /// The acknowledged record.
    pub id: RecordId,
    /// The timestamp the record carried when it was pushed. The ack is
    /// ignored if the record was re-edited mid-flight.
    pub pushed_at: Timestamp,
    /// The server's authoritative re-stamp, when it issues one.
    pub server_updated_at: Option<Timestamp>,
}

/// The embedded, per-table record store.
///
/// `LocalStore` holds one table per synced entity type plus sync metadata
/// per record and one pull cursor per table. All mutating calls commit a
/// durable snapshot before returning; a batch merge either fully applies
/// or not at all.
///
/// Reads come in two flavors: the domain path (`get`, `query_all`) hides
/// tombstones from application code, while the sync path (`get_any`,
/// `query_dirty`) sees everything.
pub struct LocalStore {
    state: RwLock<BTreeMap<String, TableState>>,
    backend: Box<dyn StorageBackend>,
    tracker: ChangeTracker,
}

impl LocalStore {
    /// Opens a store over the given backend, resuming from its last
    /// persisted snapshot.
    pub fn open<B: StorageBackend + 'static>(backend: B) -> StoreResult<Self> {
        Self::open_with_clock(backend, Arc::new(SystemClock))
    }

    /// Opens a store with an explicit clock for local-write stamping.
    pub fn open_with_clock<B: StorageBackend + 'static>(
        backend: B,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let tables = match backend.load()? {
            Some(bytes) => Snapshot::decode(&bytes)?.tables,
            None => BTreeMap::new(),
        };

        Ok(Self {
            state: RwLock::new(tables),
            backend: Box::new(backend),
            tracker: ChangeTracker::new(clock),
        })
    }

    /// Applies a mutation and commits the resulting snapshot.
    ///
    /// The mutation runs against a scratch copy of the state; the copy is
    /// swapped in only after the backend has durably persisted it. An
    /// error from the mutation or the backend leaves the store untouched.
    fn commit<R>(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, TableState>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut state = self.state.write();
        let mut next = state.clone();

        let result = mutate(&mut next)?;

        let snapshot = Snapshot::new(next);
        let bytes = snapshot.encode()?;
        self.backend.persist(&bytes)?;
        *state = snapshot.tables;

        Ok(result)
    }

    /// Returns the names of all tables that hold any state.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.state.read().keys().cloned().collect()
    }

    /// Gets a record by ID. Tombstoned records are not visible here.
    #[must_use]
    pub fn get(&self, table: &str, id: RecordId) -> Option<StoredRecord> {
        self.get_any(table, id).filter(|r| !r.tombstoned)
    }

    /// Gets a record by ID, tombstones included. Sync-side read.
    #[must_use]
    pub fn get_any(&self, table: &str, id: RecordId) -> Option<StoredRecord> {
        self.state.read().get(table)?.records.get(&id).cloned()
    }

    /// Returns all live records of a table matching the predicate.
    #[must_use]
    pub fn query_all(
        &self,
        table: &str,
        predicate: impl Fn(&StoredRecord) -> bool,
    ) -> Vec<StoredRecord> {
        let state = self.state.read();
        let Some(table_state) = state.get(table) else {
            return Vec::new();
        };
        table_state
            .records
            .values()
            .filter(|r| !r.tombstoned && predicate(r))
            .cloned()
            .collect()
    }

    /// Returns all dirty records of a table, tombstones included.
    ///
    /// This is the derived pending-mutation set: recomputed from the
    /// records themselves, so it cannot desynchronize from them.
    #[must_use]
    pub fn query_dirty(&self, table: &str) -> Vec<StoredRecord> {
        let state = self.state.read();
        let Some(table_state) = state.get(table) else {
            return Vec::new();
        };
        table_state
            .records
            .values()
            .filter(|r| r.dirty)
            .cloned()
            .collect()
    }

    /// Returns true if the record exists and has unacknowledged local
    /// mutations. Drives "unsaved changes" indicators.
    #[must_use]
    pub fn is_dirty(&self, table: &str, id: RecordId) -> bool {
        self.get_any(table, id).map(|r| r.dirty).unwrap_or(false)
    }

    /// Total number of dirty records across all tables.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .read()
            .values()
            .map(|t| t.records.values().filter(|r| r.dirty).count())
            .sum()
    }

    /// Returns a table's pull cursor.
    #[must_use]
    pub fn cursor(&self, table: &str) -> Cursor {
        self.state
            .read()
            .get(table)
            .map(|t| t.cursor)
            .unwrap_or(Cursor::ZERO)
    }

    /// Writes a record through the local mutation path.
    ///
    /// The record is stamped dirty with a monotonic timestamp; callers
    /// never set sync metadata themselves. Reserved wire keys inside
    /// `fields` are discarded. Putting a tombstoned ID resurrects it.
    pub fn put(
        &self,
        table: &str,
        id: RecordId,
        mut fields: Map<String, Value>,
    ) -> StoreResult<StoredRecord> {
        fields.remove(FIELD_ID);
        fields.remove(FIELD_UPDATED_AT);
        fields.remove(FIELD_DELETED);

        self.commit(|state| {
            let table_state = state.entry(table.to_string()).or_default();
            let previous = table_state.records.get(&id).map(|r| r.updated_at);

            let mut record = StoredRecord {
                id,
                updated_at: Timestamp::ZERO,
                dirty: false,
                tombstoned: false,
                fields,
            };
            self.tracker.stamp_local_write(&mut record, previous);

            table_state.records.insert(id, record.clone());
            Ok(record)
        })
    }

    /// Deletes a record through the local mutation path.
    ///
    /// The record becomes a dirty tombstone: invisible to domain reads,
    /// retained until the deletion is acknowledged by the backend.
    pub fn tombstone(&self, table: &str, id: RecordId) -> StoreResult<()> {
        self.commit(|state| {
            let record = state
                .get_mut(table)
                .and_then(|t| t.records.get_mut(&id))
                .ok_or_else(|| StoreError::record_not_found(table, id))?;

            let previous = record.updated_at;
            record.tombstoned = true;
            record.fields.clear();
            self.tracker.stamp_local_write(record, Some(previous));
            Ok(())
        })
    }

    /// Applies one merged pull batch atomically and advances the cursor.
    ///
    /// The whole batch and the cursor move commit in a single durable
    /// snapshot, so a crash mid-merge leaves the table at its previous
    /// cursor with none of the batch applied. A cursor that would move
    /// backwards is rejected.
    pub fn commit_merge(
        &self,
        table: &str,
        ops: Vec<MergeOp>,
        next_cursor: Cursor,
    ) -> StoreResult<()> {
        let op_count = ops.len();

        self.commit(|state| {
            let table_state = state.entry(table.to_string()).or_default();

            if next_cursor < table_state.cursor {
                return Err(StoreError::CursorRegression {
                    table: table.to_string(),
                    current: table_state.cursor,
                    attempted: next_cursor,
                });
            }

            for op in ops {
                match op {
                    MergeOp::Apply(remote) => {
                        let updated_at = remote.updated_at;
                        let mut record = StoredRecord::from_remote(remote);
                        self.tracker.stamp_remote_write(&mut record, updated_at);
                        table_state.records.insert(record.id, record);
                    }
                    MergeOp::Delete(id) => {
                        if let Some(record) = table_state.records.get_mut(&id) {
                            let updated_at = record.updated_at;
                            record.tombstoned = true;
                            record.fields.clear();
                            self.tracker.stamp_remote_write(record, updated_at);
                        }
                    }
                }
            }

            table_state.cursor = next_cursor;
            Ok(())
        })?;

        tracing::debug!(table, ops = op_count, cursor = %next_cursor, "merged pull batch");
        Ok(())
    }

    /// Folds acknowledged pushes back into the store.
    ///
    /// An acknowledged record becomes clean - unless it was re-edited
    /// while the push was in flight, in which case it stays dirty and the
    /// newer edit goes out on the next cycle. An acknowledged tombstone is
    /// removed for good: both sides now agree the delete is final.
    pub fn mark_pushed(&self, table: &str, acks: &[AckedPush]) -> StoreResult<()> {
        if acks.is_empty() {
            return Ok(());
        }

        self.commit(|state| {
            let Some(table_state) = state.get_mut(table) else {
                return Ok(());
            };

            for ack in acks {
                let Some(record) = table_state.records.get_mut(&ack.id) else {
                    continue;
                };
                if record.updated_at != ack.pushed_at {
                    // Re-edited mid-flight; the ack is stale.
                    continue;
                }
                if record.tombstoned {
                    table_state.records.remove(&ack.id);
                } else {
                    let stamp = ack.server_updated_at.unwrap_or(ack.pushed_at);
                    self.tracker.stamp_remote_write(record, stamp);
                }
            }
            Ok(())
        })
    }

    /// Removes tombstones whose deletion both sides have agreed on.
    ///
    /// Only clean tombstones qualify; dirty ones still await push.
    /// Returns the number of records purged.
    pub fn purge_tombstones(&self, table: &str) -> StoreResult<usize> {
        let has_purgeable = {
            let state = self.state.read();
            state
                .get(table)
                .map(|t| t.records.values().any(|r| r.tombstoned && !r.dirty))
                .unwrap_or(false)
        };
        if !has_purgeable {
            return Ok(0);
        }

        self.commit(|state| {
            let Some(table_state) = state.get_mut(table) else {
                return Ok(0);
            };
            let before = table_state.records.len();
            table_state.records.retain(|_, r| !(r.tombstoned && !r.dirty));
            Ok(before - table_state.records.len())
        })
    }

    /// Rewinds a table's cursor to zero for a full resync.
    ///
    /// This is the one sanctioned cursor rewind. Records are kept; the
    /// next pull re-downloads the table's history and converges through
    /// the ordinary merge path.
    pub fn reset_for_full_resync(&self, table: &str) -> StoreResult<()> {
        self.commit(|state| {
            let table_state = state.entry(table.to_string()).or_default();
            table_state.cursor = Cursor::ZERO;
            Ok(())
        })?;

        tracing::info!(table, "cursor reset for full resync");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::tracker::ManualClock;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn open_store(clock_millis: i64) -> (LocalStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(clock_millis));
        let store =
            LocalStore::open_with_clock(MemoryBackend::new(), Arc::clone(&clock) as Arc<dyn Clock>)
                .unwrap();
        (store, clock)
    }

    #[test]
    fn put_stamps_dirty() {
        let (store, _) = open_store(100);
        let id = RecordId::new();

        let record = store
            .put("players", id, fields(&[("name", json!("Alice"))]))
            .unwrap();

        assert!(record.dirty);
        assert_eq!(record.updated_at, Timestamp::from_millis(100));
        assert!(store.is_dirty("players", id));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn put_strips_reserved_keys() {
        let (store, _) = open_store(100);
        let id = RecordId::new();

        let record = store
            .put(
                "players",
                id,
                fields(&[("id", json!("shadow")), ("name", json!("Alice"))]),
            )
            .unwrap();

        assert!(!record.fields.contains_key("id"));
        assert_eq!(record.fields["name"], json!("Alice"));
    }

    #[test]
    fn tombstone_hides_record_from_domain_reads() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        store.put("players", id, Map::new()).unwrap();

        store.tombstone("players", id).unwrap();

        assert!(store.get("players", id).is_none());
        let raw = store.get_any("players", id).unwrap();
        assert!(raw.tombstoned);
        assert!(raw.dirty);
        assert_eq!(store.query_all("players", |_| true).len(), 0);
        assert_eq!(store.query_dirty("players").len(), 1);
    }

    #[test]
    fn tombstone_of_missing_record_errors() {
        let (store, _) = open_store(100);
        let result = store.tombstone("players", RecordId::new());
        assert!(matches!(result, Err(StoreError::RecordNotFound { .. })));
    }

    #[test]
    fn put_resurrects_tombstone_with_newer_stamp() {
        let (store, clock) = open_store(100);
        let id = RecordId::new();
        store.put("players", id, Map::new()).unwrap();
        clock.advance(10);
        store.tombstone("players", id).unwrap();

        clock.advance(10);
        let record = store
            .put("players", id, fields(&[("name", json!("back"))]))
            .unwrap();

        assert!(!record.tombstoned);
        assert!(record.updated_at > Timestamp::from_millis(110));
        assert!(store.get("players", id).is_some());
    }

    #[test]
    fn commit_merge_applies_batch_and_cursor_together() {
        let (store, _) = open_store(100);
        let id = RecordId::new();

        let remote = RemoteRecord::new(
            id,
            Timestamp::from_millis(50),
            fields(&[("name", json!("Remote"))]),
        );
        store
            .commit_merge("players", vec![MergeOp::Apply(remote)], Cursor::new(7))
            .unwrap();

        let record = store.get("players", id).unwrap();
        assert!(!record.dirty);
        assert_eq!(record.updated_at, Timestamp::from_millis(50));
        assert_eq!(store.cursor("players"), Cursor::new(7));
    }

    #[test]
    fn commit_merge_rejects_cursor_regression() {
        let (store, _) = open_store(100);
        store.commit_merge("players", vec![], Cursor::new(5)).unwrap();

        let result = store.commit_merge("players", vec![], Cursor::new(3));
        assert!(matches!(result, Err(StoreError::CursorRegression { .. })));
        assert_eq!(store.cursor("players"), Cursor::new(5));
    }

    #[test]
    fn failed_merge_leaves_state_untouched() {
        let (store, _) = open_store(100);
        store.commit_merge("players", vec![], Cursor::new(5)).unwrap();

        let id = RecordId::new();
        let remote = RemoteRecord::new(id, Timestamp::from_millis(50), Map::new());

        // Regressing cursor aborts the whole batch, including its ops.
        let result = store.commit_merge("players", vec![MergeOp::Apply(remote)], Cursor::new(1));
        assert!(result.is_err());
        assert!(store.get_any("players", id).is_none());
    }

    #[test]
    fn merge_delete_creates_clean_tombstone() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        let remote = RemoteRecord::new(id, Timestamp::from_millis(50), Map::new());
        store
            .commit_merge("players", vec![MergeOp::Apply(remote)], Cursor::new(1))
            .unwrap();

        store
            .commit_merge("players", vec![MergeOp::Delete(id)], Cursor::new(2))
            .unwrap();

        let record = store.get_any("players", id).unwrap();
        assert!(record.tombstoned);
        assert!(!record.dirty);

        assert_eq!(store.purge_tombstones("players").unwrap(), 1);
        assert!(store.get_any("players", id).is_none());
    }

    #[test]
    fn merge_delete_of_unknown_id_is_a_no_op() {
        let (store, _) = open_store(100);
        store
            .commit_merge(
                "players",
                vec![MergeOp::Delete(RecordId::new())],
                Cursor::new(1),
            )
            .unwrap();
        assert_eq!(store.cursor("players"), Cursor::new(1));
    }

    #[test]
    fn mark_pushed_clears_dirty() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        let record = store.put("players", id, Map::new()).unwrap();

        store
            .mark_pushed(
                "players",
                &[AckedPush {
                    id,
                    pushed_at: record.updated_at,
                    server_updated_at: None,
                }],
            )
            .unwrap();

        let record = store.get("players", id).unwrap();
        assert!(!record.dirty);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn mark_pushed_adopts_server_restamp() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        let record = store.put("players", id, Map::new()).unwrap();

        store
            .mark_pushed(
                "players",
                &[AckedPush {
                    id,
                    pushed_at: record.updated_at,
                    server_updated_at: Some(Timestamp::from_millis(9999)),
                }],
            )
            .unwrap();

        assert_eq!(
            store.get("players", id).unwrap().updated_at,
            Timestamp::from_millis(9999)
        );
    }

    #[test]
    fn mark_pushed_ignores_stale_ack_after_reedit() {
        let (store, clock) = open_store(100);
        let id = RecordId::new();
        let pushed = store.put("players", id, Map::new()).unwrap();

        // Record is edited again while the push is in flight.
        clock.advance(50);
        store
            .put("players", id, fields(&[("name", json!("newer"))]))
            .unwrap();

        store
            .mark_pushed(
                "players",
                &[AckedPush {
                    id,
                    pushed_at: pushed.updated_at,
                    server_updated_at: None,
                }],
            )
            .unwrap();

        // The newer edit must stay dirty.
        assert!(store.is_dirty("players", id));
    }

    #[test]
    fn acked_tombstone_is_purged() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        store.put("players", id, Map::new()).unwrap();
        store.tombstone("players", id).unwrap();
        let pushed_at = store.get_any("players", id).unwrap().updated_at;

        store
            .mark_pushed(
                "players",
                &[AckedPush {
                    id,
                    pushed_at,
                    server_updated_at: None,
                }],
            )
            .unwrap();

        assert!(store.get_any("players", id).is_none());
    }

    #[test]
    fn dirty_tombstones_survive_purge() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        store.put("players", id, Map::new()).unwrap();
        store.tombstone("players", id).unwrap();

        assert_eq!(store.purge_tombstones("players").unwrap(), 0);
        assert!(store.get_any("players", id).is_some());
    }

    #[test]
    fn state_survives_reopen() {
        let backend = MemoryBackend::new();
        let clock = Arc::new(ManualClock::new(100));
        let id = RecordId::new();

        {
            let store = LocalStore::open_with_clock(
                backend.share(),
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .unwrap();
            store
                .put("teams", id, fields(&[("name", json!("Eagles"))]))
                .unwrap();
            store.commit_merge("teams", vec![], Cursor::new(12)).unwrap();
        }

        let store = LocalStore::open(backend).unwrap();
        let record = store.get("teams", id).unwrap();
        assert!(record.dirty);
        assert_eq!(record.fields["name"], json!("Eagles"));
        assert_eq!(store.cursor("teams"), Cursor::new(12));
    }

    #[test]
    fn reset_for_full_resync_rewinds_cursor_only() {
        let (store, _) = open_store(100);
        let id = RecordId::new();
        store.put("teams", id, Map::new()).unwrap();
        store.commit_merge("teams", vec![], Cursor::new(9)).unwrap();

        store.reset_for_full_resync("teams").unwrap();

        assert_eq!(store.cursor("teams"), Cursor::ZERO);
        assert!(store.get_any("teams", id).is_some());
    }

    #[test]
    fn cursor_of_unknown_table_is_zero() {
        let (store, _) = open_store(100);
        assert_eq!(store.cursor("nowhere"), Cursor::ZERO);
        assert!(store.query_dirty("nowhere").is_empty());
        assert!(store.query_all("nowhere", |_| true).is_empty());
    }
}
