//! The wire shape of a synced record.

use crate::error::{ProtocolResult, RecordError};
use crate::types::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key carrying the record identifier.
pub const FIELD_ID: &str = "id";
/// Reserved key carrying the conflict-resolution timestamp.
pub const FIELD_UPDATED_AT: &str = "updatedAt";
/// Reserved key marking a pushed deletion.
pub const FIELD_DELETED: &str = "deleted";

fn is_false(b: &bool) -> bool {
    !*b
}

/// A domain record as it travels between client and backend.
///
/// The shape is the backend's ordinary JSON row: domain fields at the top
/// level, plus the required `id` and `updatedAt` keys. A pushed deletion
/// is the same row with `deleted: true`; that keeps the push contract a
/// plain list of records while still letting tombstones reach the server.
///
/// The `fields` map never contains the reserved keys; constructors strip
/// them so a round trip cannot emit duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Stable record identifier.
    pub id: RecordId,
    /// Ordering key for last-writer-wins resolution.
    #[serde(rename = "updatedAt")]
    pub updated_at: Timestamp,
    /// True if this row represents a deletion.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    /// Domain fields, untouched by the sync layer.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    /// Creates a record from domain fields.
    ///
    /// Reserved keys in `fields` are discarded; the explicit arguments win.
    #[must_use]
    pub fn new(id: RecordId, updated_at: Timestamp, mut fields: Map<String, Value>) -> Self {
        fields.remove(FIELD_ID);
        fields.remove(FIELD_UPDATED_AT);
        fields.remove(FIELD_DELETED);
        Self {
            id,
            updated_at,
            deleted: false,
            fields,
        }
    }

    /// Creates a deletion row for the given record.
    #[must_use]
    pub fn deletion(id: RecordId, updated_at: Timestamp) -> Self {
        Self {
            id,
            updated_at,
            deleted: true,
            fields: Map::new(),
        }
    }

    /// Validates a loosely-typed backend row.
    ///
    /// This is the boundary check rows must pass before they may enter the
    /// local store: the row must be a JSON object with a parseable `id` and
    /// an integer `updatedAt`. Everything else is carried through untouched.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(RecordError::NotAnObject);
        };

        let id = match map.remove(FIELD_ID) {
            Some(Value::String(s)) => {
                RecordId::parse(&s).map_err(|_| RecordError::InvalidId(s))?
            }
            Some(other) => return Err(RecordError::InvalidId(other.to_string())),
            None => return Err(RecordError::MissingField(FIELD_ID)),
        };

        let updated_at = match map.remove(FIELD_UPDATED_AT) {
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Timestamp::from_millis)
                .ok_or(RecordError::InvalidTimestamp)?,
            Some(_) => return Err(RecordError::InvalidTimestamp),
            None => return Err(RecordError::MissingField(FIELD_UPDATED_AT)),
        };

        let deleted = match map.remove(FIELD_DELETED) {
            Some(Value::Bool(b)) => b,
            Some(_) => return Err(RecordError::InvalidDeletedMarker),
            None => false,
        };

        Ok(Self {
            id,
            updated_at,
            deleted,
            fields: map,
        })
    }

    /// Converts the record back into a plain JSON row.
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut map = self.fields;
        map.insert(FIELD_ID.into(), Value::String(self.id.to_string()));
        map.insert(
            FIELD_UPDATED_AT.into(),
            Value::Number(self.updated_at.as_millis().into()),
        );
        if self.deleted {
            map.insert(FIELD_DELETED.into(), Value::Bool(true));
        }
        Value::Object(map)
    }
}
