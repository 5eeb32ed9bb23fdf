//! Typed table facade.

use crate::error::{StoreError, StoreResult};
use crate::record::StoredRecord;
use crate::store::LocalStore;
use rosterbase_protocol::{RecordId, FIELD_ID, FIELD_UPDATED_AT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A domain entity stored in a synced table.
///
/// Implementors declare which table they live in and how to read their
/// record ID. Serialization must produce a JSON object; the sync
/// metadata (`updatedAt`, `dirty`, tombstones) is managed by the store
/// and never appears in the entity itself, though an entity may expose a
/// read-only `updatedAt` field if the UI wants to display it.
pub trait SyncEntity: Serialize + DeserializeOwned {
    /// Name of the table this entity type lives in.
    const TABLE: &'static str;

    /// Returns the entity's stable record ID.
    fn record_id(&self) -> RecordId;
}

/// Type-safe access to one synced table.
///
/// `TypedTable<T>` wraps the raw envelope API of [`LocalStore`] with
/// serde encoding, so application code works with plain structs. All
/// writes still route through the change tracker; there is no way to
/// produce an unstamped record from here.
///
/// Filtering is done with host-language constructs:
///
/// ```rust,ignore
/// let keepers: Vec<Player> = players.iter()?.filter(|p| p.position == "keeper").collect();
/// ```
pub struct TypedTable<T: SyncEntity> {
    store: Arc<LocalStore>,
    _marker: PhantomData<T>,
}

impl<T: SyncEntity> TypedTable<T> {
    /// Creates a typed view over the store.
    #[must_use]
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        T::TABLE
    }

    /// Writes an entity through the local mutation path.
    pub fn put(&self, entity: &T) -> StoreResult<()> {
        let Value::Object(fields) = serde_json::to_value(entity)? else {
            return Err(StoreError::InvalidEntity);
        };
        self.store.put(T::TABLE, entity.record_id(), fields)?;
        Ok(())
    }

    /// Gets an entity by ID.
    ///
    /// Returns `None` if the entity doesn't exist or is deleted.
    pub fn get(&self, id: RecordId) -> StoreResult<Option<T>> {
        match self.store.get(T::TABLE, id) {
            Some(record) => Ok(Some(decode(&record)?)),
            None => Ok(None),
        }
    }

    /// Deletes an entity by ID.
    pub fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.store.tombstone(T::TABLE, id)
    }

    /// Returns all live entities in the table.
    pub fn scan_all(&self) -> StoreResult<Vec<T>> {
        self.store
            .query_all(T::TABLE, |_| true)
            .iter()
            .map(decode)
            .collect()
    }

    /// Returns an iterator over all live entities.
    pub fn iter(&self) -> StoreResult<impl Iterator<Item = T>> {
        Ok(self.scan_all()?.into_iter())
    }

    /// Returns true if the entity has unacknowledged local mutations.
    #[must_use]
    pub fn is_dirty(&self, id: RecordId) -> bool {
        self.store.is_dirty(T::TABLE, id)
    }
}

fn decode<T: SyncEntity>(record: &StoredRecord) -> StoreResult<T> {
    let mut map = record.fields.clone();
    map.insert(FIELD_ID.into(), Value::String(record.id.to_string()));
    map.insert(
        FIELD_UPDATED_AT.into(),
        Value::Number(record.updated_at.as_millis().into()),
    );
    Ok(serde_json::from_value(Value::Object(map))?)
}
