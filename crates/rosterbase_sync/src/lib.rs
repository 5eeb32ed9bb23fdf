//! # Rosterbase Sync
//!
//! Offline-first synchronization engine.
//!
//! This crate provides:
//! - `RemoteGateway`: the I/O boundary to the authoritative backend
//! - `SyncEngine`: push-then-pull cycles with last-writer-wins merging
//! - `SyncScheduler`: trigger coalescing and a single cycle driver
//! - `SyncStatus`: the read model behind UI sync indicators
//!
//! ## Architecture
//!
//! A sync cycle runs two ordered phases per table:
//! 1. **Push** dirty local records; acknowledged ones become clean
//! 2. **Pull** remote pages, merging each atomically with its cursor
//!
//! Push precedes pull so a device's own edits are not re-downloaded and
//! misclassified as remote-wins conflicts against themselves.
//!
//! ## Key invariants
//!
//! - The backend is authoritative; clean local copies always follow it
//! - Conflicts against dirty copies resolve by last-writer-wins on
//!   `updatedAt`, ties to the remote
//! - Cursors advance only after their batch is durably merged, and never
//!   advance on an aborted phase
//! - Push is idempotent on `(id, updatedAt)`; retried cycles are safe
//! - At most one cycle runs at a time process-wide

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod gateway;
mod scheduler;
mod status;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{
    ConflictResolved, ConflictWinner, CycleReport, SyncEngine, TablePhase, TableReport,
};
pub use error::{SyncError, SyncResult};
pub use gateway::{MockGateway, RemoteGateway};
pub use scheduler::SyncScheduler;
pub use status::{StatusTracker, SyncStatus};
