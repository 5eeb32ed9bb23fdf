//! # Rosterbase Sync Protocol
//!
//! Wire-level types shared between the local store and the sync engine.
//!
//! This crate provides:
//! - Identifier, timestamp and cursor newtypes
//! - The JSON wire shape of a synced record (`RemoteRecord`)
//! - Push/pull message types (`PushOutcome`, `PullPage`)
//! - Boundary validation of loosely-typed backend rows
//!
//! Payloads are the same JSON-shaped domain rows the backend serves
//! everywhere else; no separate wire format is introduced. The only
//! requirements this crate enforces are a parseable `id` and an integer
//! `updatedAt` on every row, checked before a row may enter the local store.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod record;
mod types;

pub use error::{ProtocolResult, RecordError};
pub use messages::{PullPage, PushAck, PushOutcome, PushRejection};
pub use record::{RemoteRecord, FIELD_DELETED, FIELD_ID, FIELD_UPDATED_AT};
pub use types::{Cursor, RecordId, Timestamp};
