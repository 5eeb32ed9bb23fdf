//! Sync cycle orchestration.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::status::{StatusTracker, SyncStatus};
use parking_lot::RwLock;
use rosterbase_protocol::{PullPage, PushRejection, RecordId, RemoteRecord, Timestamp};
use rosterbase_store::{AckedPush, LocalStore, MergeOp, StoredRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-table position in the sync state machine.
///
/// A table moves `Idle -> Pushing -> Pulling -> Idle` on success, or ends
/// a failed cycle in `Failed` until the next cycle picks it up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TablePhase {
    /// No cycle is touching this table.
    #[default]
    Idle,
    /// Dirty records are being pushed.
    Pushing,
    /// Remote pages are being pulled and merged.
    Pulling,
    /// The last cycle aborted on this table; its cursor did not advance.
    Failed,
}

/// Which side won a last-writer-wins resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    /// The dirty local edit was kept and will be re-pushed.
    Local,
    /// The local edit was discarded in favor of the remote version.
    Remote,
}

/// Telemetry signal for a resolved conflict.
///
/// Not an error: this feeds logging and the "your change was overridden"
/// messaging in the UI.
#[derive(Debug, Clone)]
pub struct ConflictResolved {
    /// Table the record lives in.
    pub table: String,
    /// The contested record.
    pub id: RecordId,
    /// Timestamp of the dirty local copy.
    pub local_updated_at: Timestamp,
    /// Timestamp of the incoming remote change; `None` for a bare
    /// deletion, which carries no timestamp.
    pub remote_updated_at: Option<Timestamp>,
    /// The side that won.
    pub winner: ConflictWinner,
}

/// Outcome of syncing one table.
#[derive(Debug, Default)]
pub struct TableReport {
    /// The table this report covers.
    pub table: String,
    /// Records pushed and acknowledged.
    pub pushed: usize,
    /// Remote upserts merged into the store.
    pub pulled: usize,
    /// Remote deletions applied as tombstones.
    pub deletes_applied: usize,
    /// Acknowledged tombstones removed after the cycle.
    pub purged: usize,
    /// Conflicts resolved during the pull phase.
    pub conflicts: Vec<ConflictResolved>,
    /// Records the backend rejected during the push phase.
    pub rejected: Vec<PushRejection>,
    /// The failure that aborted this table's cycle, if any.
    pub error: Option<SyncError>,
}

impl TableReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Returns true if this table completed its cycle.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one sync cycle across tables.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Per-table outcomes, in processing order.
    pub tables: Vec<TableReport>,
}

impl CycleReport {
    /// Returns true if every table completed its cycle.
    #[must_use]
    pub fn success(&self) -> bool {
        self.tables.iter().all(TableReport::succeeded)
    }

    /// Returns true if any table failed with a retryable error.
    #[must_use]
    pub fn has_retryable_failure(&self) -> bool {
        self.tables
            .iter()
            .any(|t| t.error.as_ref().map(SyncError::is_retryable).unwrap_or(false))
    }

    /// Returns the first failure message, if any table failed.
    #[must_use]
    pub fn first_error(&self) -> Option<String> {
        self.tables
            .iter()
            .find_map(|t| t.error.as_ref().map(|e| e.to_string()))
    }
}

/// Decides whether an incoming remote record overwrites the local copy.
///
/// Clean local copies always follow the remote (the common case of
/// other-device edits arriving). Dirty copies are genuine conflicts and
/// go through last-writer-wins; ties favor the remote so all devices
/// converge without a tiebreak identity comparison.
fn remote_wins(local: &StoredRecord, remote_updated_at: Timestamp) -> bool {
    !local.dirty || remote_updated_at >= local.updated_at
}

/// Decides whether a bare remote deletion applies to the local copy.
///
/// Deletions in a pull page carry no timestamp, so a dirty local edit is
/// never clobbered by one - it survives and re-pushes. A dirty tombstone
/// meeting its own id here is already consistent with the remote and
/// counts as acknowledged.
fn remote_delete_wins(local: &StoredRecord) -> bool {
    !local.dirty || local.tombstoned
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates sync cycles against the remote backend.
///
/// A cycle runs two ordered phases per table: **push** dirty records,
/// then **pull** remote pages and merge them. Push precedes pull so a
/// device's own edits are never misclassified as remote-wins conflicts
/// against themselves.
///
/// Failure isolation: a transient failure aborts the current table's
/// cycle without advancing its cursor; other tables in the same cycle are
/// unaffected. Push progress is never rolled back - acknowledged records
/// stay acknowledged - while pull progress is atomic per page.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    config: SyncConfig,
    status: StatusTracker,
    phases: RwLock<HashMap<String, TablePhase>>,
    /// `(table, id) -> rejected stamp`: dirty records the backend refused,
    /// excluded from automatic retry until re-edited.
    rejected: RwLock<HashMap<(String, RecordId), Timestamp>>,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl SyncEngine {
    /// Creates a new engine.
    pub fn new(store: Arc<LocalStore>, gateway: Arc<dyn RemoteGateway>, config: SyncConfig) -> Self {
        let status = StatusTracker::new(config.stuck_cycle_threshold.max(1) * 2);
        Self {
            store,
            gateway,
            config,
            status,
            phases: RwLock::new(HashMap::new()),
            rejected: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the engine's configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store this engine reconciles.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the current status read model.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    /// Returns true if sync looks stuck (see [`StatusTracker::is_stuck`]).
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        self.status.is_stuck(self.config.stuck_cycle_threshold)
    }

    /// Returns a table's current phase.
    #[must_use]
    pub fn table_phase(&self, table: &str) -> TablePhase {
        self.phases.read().get(table).copied().unwrap_or_default()
    }

    /// Requests cancellation of the in-flight cycle.
    ///
    /// Cancellation lands between batches and pages, never inside a batch
    /// merge. Records already pushed stay acknowledged; pull progress
    /// stops at the last committed page.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_phase(&self, table: &str, phase: TablePhase) {
        self.phases.write().insert(table.to_string(), phase);
    }

    fn sync_tables(&self) -> Vec<String> {
        if self.config.tables.is_empty() {
            self.store.tables()
        } else {
            self.config.tables.clone()
        }
    }

    /// Runs one sync cycle.
    ///
    /// `only` restricts the cycle to the given tables; `None` syncs the
    /// configured set. At most one cycle may run at a time; a concurrent
    /// call fails with [`SyncError::CycleInProgress`].
    ///
    /// Per-table failures are reported, not raised: the returned
    /// [`CycleReport`] carries each table's outcome. The call itself only
    /// fails on cancellation or overlap.
    pub async fn sync_cycle(&self, only: Option<&[String]>) -> SyncResult<CycleReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::CycleInProgress);
        }
        let _guard = RunningGuard(&self.running);
        self.cancelled.store(false, Ordering::SeqCst);

        let tables = match only {
            Some(tables) => tables.to_vec(),
            None => self.sync_tables(),
        };

        let mut report = CycleReport::default();
        for table in &tables {
            match self.sync_table(table).await {
                Ok(table_report) => report.tables.push(table_report),
                Err(SyncError::Cancelled) => {
                    tracing::debug!(table = %table, "sync cycle cancelled");
                    return Err(SyncError::Cancelled);
                }
                Err(e) => return Err(e),
            }
        }

        self.status
            .record_cycle(self.store.pending_count(), report.first_error());

        tracing::info!(
            tables = tables.len(),
            success = report.success(),
            pushed = report.tables.iter().map(|t| t.pushed).sum::<usize>(),
            pulled = report.tables.iter().map(|t| t.pulled).sum::<usize>(),
            "sync cycle finished"
        );

        Ok(report)
    }

    /// Runs sync cycles with exponential backoff until no table fails
    /// transiently or the attempt limit is reached.
    pub async fn sync_with_retry(&self, only: Option<&[String]>) -> SyncResult<CycleReport> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = self.config.retry.delay_for_attempt(attempt);
                tracing::debug!(attempt, ?delay, "retrying sync cycle");
                tokio::time::sleep(delay).await;
            }

            let report = self.sync_cycle(only).await?;
            attempt += 1;

            if attempt >= max_attempts || !report.has_retryable_failure() {
                return Ok(report);
            }
        }
    }

    /// Runs one table through push then pull.
    ///
    /// Returns `Err` only for cancellation; phase failures land in the
    /// report so the cycle can continue with other tables.
    async fn sync_table(&self, table: &str) -> SyncResult<TableReport> {
        let mut report = TableReport::new(table);

        let outcome = self.sync_table_inner(table, &mut report).await;

        match outcome {
            Ok(()) => {
                self.set_phase(table, TablePhase::Idle);
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                self.set_phase(table, TablePhase::Idle);
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                self.set_phase(table, TablePhase::Failed);
                tracing::warn!(table, error = %e, "table sync aborted");
                report.error = Some(e);
                Ok(report)
            }
        }
    }

    async fn sync_table_inner(&self, table: &str, report: &mut TableReport) -> SyncResult<()> {
        self.set_phase(table, TablePhase::Pushing);
        self.push_phase(table, report).await?;

        self.check_cancelled()?;

        self.set_phase(table, TablePhase::Pulling);
        self.pull_phase(table, report).await?;

        report.purged = self.store.purge_tombstones(table)?;
        Ok(())
    }

    /// Pushes dirty records in batches and folds acks back into the store.
    async fn push_phase(&self, table: &str, report: &mut TableReport) -> SyncResult<()> {
        let to_push: Vec<StoredRecord> = {
            let rejected = self.rejected.read();
            self.store
                .query_dirty(table)
                .into_iter()
                .filter(|r| rejected.get(&(table.to_string(), r.id)) != Some(&r.updated_at))
                .collect()
        };

        if to_push.is_empty() {
            return Ok(());
        }

        tracing::debug!(table, dirty = to_push.len(), "pushing dirty records");

        for batch in to_push.chunks(self.config.push_batch_size.max(1)) {
            self.check_cancelled()?;

            let stamps: HashMap<RecordId, Timestamp> =
                batch.iter().map(|r| (r.id, r.updated_at)).collect();
            let wire: Vec<RemoteRecord> = batch.iter().map(StoredRecord::to_remote).collect();

            let outcome = self.gateway.push(table, wire).await?;

            let acks: Vec<AckedPush> = outcome
                .accepted
                .iter()
                .filter_map(|ack| {
                    stamps.get(&ack.id).map(|&pushed_at| AckedPush {
                        id: ack.id,
                        pushed_at,
                        server_updated_at: ack.updated_at,
                    })
                })
                .collect();
            self.store.mark_pushed(table, &acks)?;
            report.pushed += acks.len();

            let mut rejected = self.rejected.write();
            for ack in &outcome.accepted {
                rejected.remove(&(table.to_string(), ack.id));
            }
            for rejection in &outcome.rejected {
                tracing::warn!(
                    table,
                    id = %rejection.id,
                    reason = %rejection.reason,
                    "record rejected by backend"
                );
                if let Some(&stamp) = stamps.get(&rejection.id) {
                    rejected.insert((table.to_string(), rejection.id), stamp);
                }
            }
            drop(rejected);

            report.rejected.extend(outcome.rejected);
        }

        Ok(())
    }

    /// Pulls remote pages and merges them until the table is caught up.
    async fn pull_phase(&self, table: &str, report: &mut TableReport) -> SyncResult<()> {
        let limit = self.config.pull_page_size.max(1);

        loop {
            self.check_cancelled()?;

            let cursor = self.store.cursor(table);
            let PullPage {
                records,
                deleted_ids,
                next_cursor,
            } = self.gateway.pull(table, cursor, limit).await?;

            let change_count = records.len() + deleted_ids.len();
            let mut ops = Vec::with_capacity(change_count);

            for remote in records {
                match self.store.get_any(table, remote.id) {
                    None => {
                        report.pulled += 1;
                        ops.push(MergeOp::Apply(remote));
                    }
                    Some(local) => {
                        if local.dirty {
                            let winner = if remote_wins(&local, remote.updated_at) {
                                ConflictWinner::Remote
                            } else {
                                ConflictWinner::Local
                            };
                            tracing::info!(
                                table,
                                id = %local.id,
                                local_updated_at = %local.updated_at,
                                remote_updated_at = %remote.updated_at,
                                ?winner,
                                "conflict resolved by last-writer-wins"
                            );
                            report.conflicts.push(ConflictResolved {
                                table: table.to_string(),
                                id: local.id,
                                local_updated_at: local.updated_at,
                                remote_updated_at: Some(remote.updated_at),
                                winner,
                            });
                            if winner == ConflictWinner::Local {
                                // The dirty edit stays and supersedes the
                                // remote value on the next push phase.
                                continue;
                            }
                        }
                        report.pulled += 1;
                        ops.push(MergeOp::Apply(remote));
                    }
                }
            }

            for id in deleted_ids {
                let Some(local) = self.store.get_any(table, id) else {
                    continue;
                };
                if remote_delete_wins(&local) {
                    report.deletes_applied += 1;
                    ops.push(MergeOp::Delete(id));
                } else {
                    report.conflicts.push(ConflictResolved {
                        table: table.to_string(),
                        id,
                        local_updated_at: local.updated_at,
                        remote_updated_at: None,
                        winner: ConflictWinner::Local,
                    });
                }
            }

            if next_cursor == cursor && ops.is_empty() {
                break;
            }

            self.store.commit_merge(table, ops, next_cursor)?;

            if next_cursor == cursor || change_count < limit {
                break;
            }
        }

        Ok(())
    }
}
