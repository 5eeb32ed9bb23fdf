//! Sync metadata stamping.
//!
//! The change tracker is the single choke point through which every write
//! acquires its `dirty` flag and `updated_at` stamp. Local writes and
//! remote merges get different stamps, and nothing outside this module
//! produces a record whose dirty flag disagrees with its provenance.

use crate::record::StoredRecord;
use rosterbase_protocol::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of local timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Timestamp::from_millis(millis as i64)
    }
}

/// A hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given millisecond value.
    #[must_use]
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Sets the clock to an absolute value.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Advances the clock.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Stamps sync metadata onto records.
pub struct ChangeTracker {
    clock: Arc<dyn Clock>,
}

impl ChangeTracker {
    /// Creates a tracker driven by the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Creates a tracker driven by the system clock.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Stamps a local mutation: the record becomes dirty with a timestamp
    /// strictly greater than `previous`.
    ///
    /// The strict increase keeps a record's `updated_at` monotonic even
    /// when the wall clock stalls or steps backwards between edits.
    pub fn stamp_local_write(&self, record: &mut StoredRecord, previous: Option<Timestamp>) {
        let floor = previous.map(|t| t.next()).unwrap_or(Timestamp::ZERO);
        record.updated_at = self.clock.now().max(floor);
        record.dirty = true;
    }

    /// Stamps a remote-sourced write: the record becomes clean and adopts
    /// the remote timestamp.
    pub fn stamp_remote_write(&self, record: &mut StoredRecord, updated_at: Timestamp) {
        record.updated_at = updated_at;
        record.dirty = false;
    }
}
