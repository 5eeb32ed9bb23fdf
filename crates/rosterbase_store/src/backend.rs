//! Storage backend trait definition.

use crate::error::StoreResult;

/// A snapshot store for the local database.
///
/// Backends are **opaque byte stores**: they hold exactly one snapshot and
/// replace it atomically. The store owns all format interpretation -
/// backends do not understand tables, records, or cursors.
///
/// # Invariants
///
/// - `load` returns the bytes of the most recent successful `persist`,
///   or `None` if nothing was ever persisted
/// - `persist` is all-or-nothing: after a crash, `load` observes either
///   the previous snapshot or the new one, never a mixture
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - for tests and ephemeral stores
/// - [`super::FileBackend`] - for persistent storage
pub trait StorageBackend: Send + Sync {
    /// Loads the current snapshot, if any.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Durably replaces the snapshot.
    ///
    /// After this returns successfully the new snapshot survives process
    /// termination.
    fn persist(&self, snapshot: &[u8]) -> StoreResult<()>;
}
