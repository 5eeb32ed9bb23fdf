//! Sync status read model.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Snapshot of sync health for UI status indicators.
///
/// `pending_count > 0` drives the "pending changes" indicator;
/// `last_error` plus a non-decreasing pending count across recent cycles
/// drives the stuck-sync warning banner.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Number of dirty records awaiting push, across all tables.
    pub pending_count: usize,
    /// Wall-clock time of the last fully successful cycle.
    pub last_successful_sync_at: Option<SystemTime>,
    /// Most recent cycle failure, cleared on the next success.
    pub last_error: Option<String>,
}

struct StatusInner {
    status: SyncStatus,
    /// Pending counts at the end of recent cycles, oldest first.
    pending_history: VecDeque<usize>,
}

/// Maintains the status read model across cycles.
pub struct StatusTracker {
    inner: RwLock<StatusInner>,
    history_limit: usize,
}

impl StatusTracker {
    /// Creates a tracker remembering up to `history_limit` cycle results.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: RwLock::new(StatusInner {
                status: SyncStatus::default(),
                pending_history: VecDeque::new(),
            }),
            history_limit: history_limit.max(1),
        }
    }

    /// Records the outcome of one completed cycle.
    pub fn record_cycle(&self, pending_count: usize, error: Option<String>) {
        let mut inner = self.inner.write();

        inner.pending_history.push_back(pending_count);
        while inner.pending_history.len() > self.history_limit {
            inner.pending_history.pop_front();
        }

        inner.status.pending_count = pending_count;
        match error {
            Some(message) => inner.status.last_error = Some(message),
            None => {
                inner.status.last_error = None;
                inner.status.last_successful_sync_at = Some(SystemTime::now());
            }
        }
    }

    /// Updates the pending count outside a cycle (e.g. after a local edit).
    pub fn set_pending_count(&self, pending_count: usize) {
        self.inner.write().status.pending_count = pending_count;
    }

    /// Returns the current status.
    #[must_use]
    pub fn snapshot(&self) -> SyncStatus {
        self.inner.read().status.clone()
    }

    /// Returns true if sync looks stuck: the last cycle failed and the
    /// pending count has not decreased across the last `cycles` cycles.
    #[must_use]
    pub fn is_stuck(&self, cycles: usize) -> bool {
        let inner = self.inner.read();

        if inner.status.last_error.is_none() || inner.status.pending_count == 0 {
            return false;
        }

        let history = &inner.pending_history;
        if cycles == 0 || history.len() < cycles {
            return false;
        }

        history
            .iter()
            .rev()
            .take(cycles)
            .collect::<Vec<_>>()
            .windows(2)
            .all(|w| w[0] >= w[1]) // reversed: newest first, so newest >= older
    }
}
