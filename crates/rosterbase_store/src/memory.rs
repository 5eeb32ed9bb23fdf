//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::StoreResult;
use parking_lot::Mutex;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Suitable for unit tests, integration tests, and ephemeral stores that
/// don't need persistence.
///
/// Two backends created with [`MemoryBackend::share`] point at the same
/// buffer, which lets a test drop one store and open a fresh one over the
/// identical bytes - the same thing a process restart does to a file.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a backend sharing this backend's buffer.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }

    /// Returns a copy of the current snapshot bytes, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.data.lock().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.lock().clone())
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        *self.data.lock() = Some(snapshot.to_vec());
        Ok(())
    }
}
