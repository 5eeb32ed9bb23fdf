//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "store.json";
const TEMP_FILE: &str = "store.json.tmp";
const LOCK_FILE: &str = "lock";

/// A file-based storage backend.
///
/// The backend owns a directory containing the snapshot file and an
/// exclusive lock file. Data survives process restarts.
///
/// # Durability
///
/// `persist` writes the new snapshot to a temporary file, syncs it, and
/// renames it over the old one. The rename is atomic on the filesystems
/// we target, so a crash at any point leaves either the old or the new
/// snapshot in place.
///
/// # Locking
///
/// An exclusive `fs2` lock is taken on open and held for the lifetime of
/// the backend, so two processes cannot write the same store directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    /// Held for the lifetime of the backend; dropping releases the lock.
    _lock: File,
}

impl FileBackend {
    /// Opens or creates a store directory at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] if another process holds the
    /// lock, or an I/O error if the directory cannot be created.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::StoreLocked)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock: lock,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        let tmp_path = self.dir.join(TEMP_FILE);

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(snapshot)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, self.snapshot_path())?;

        // Make the rename itself durable.
        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;

        Ok(())
    }
}
