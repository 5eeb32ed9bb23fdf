//! Sync trigger scheduling and coalescing.

use crate::engine::SyncEngine;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// The coalesced set of tables awaiting a cycle.
#[derive(Debug, Clone)]
enum Pending {
    /// Sync the engine's configured table set.
    All,
    /// Sync only these tables.
    Tables(BTreeSet<String>),
}

impl Pending {
    fn merge(current: Option<Self>, request: Option<Vec<String>>) -> Self {
        match (current, request) {
            (Some(Pending::All), _) | (_, None) => Pending::All,
            (Some(Pending::Tables(mut set)), Some(tables)) => {
                set.extend(tables);
                Pending::Tables(set)
            }
            (None, Some(tables)) => Pending::Tables(tables.into_iter().collect()),
        }
    }
}

struct SchedulerInner {
    engine: Arc<SyncEngine>,
    notify: Notify,
    pending: Mutex<Option<Pending>>,
    connected: AtomicBool,
    shutdown: AtomicBool,
}

/// Decides when sync cycles run.
///
/// Triggers:
/// - explicit [`request_sync`](SyncScheduler::request_sync) calls (e.g.
///   a refresh action, or after joining a team so newly-relevant data is
///   pulled immediately)
/// - a fixed interval while connected (from the engine's configuration)
/// - the connectivity-regained edge of
///   [`set_connected`](SyncScheduler::set_connected)
///
/// Requests coalesce: a trigger during an in-flight cycle does not queue
/// a second cycle per trigger, it merges into one pending re-run that
/// starts once the current cycle finishes - picking up any mutations made
/// meanwhile. [`run`](SyncScheduler::run) is the single driver task, so
/// at most one cycle runs at a time process-wide.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    /// Creates a scheduler for the given engine, initially connected.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                engine,
                notify: Notify::new(),
                pending: Mutex::new(None),
                connected: AtomicBool::new(true),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Requests a sync cycle.
    ///
    /// `tables` restricts the cycle; `None` syncs the configured set. If a
    /// cycle is already running the request coalesces with any other
    /// pending requests and re-runs once the in-flight cycle finishes.
    pub fn request_sync(&self, tables: Option<Vec<String>>) {
        let mut pending = self.inner.pending.lock();
        *pending = Some(Pending::merge(pending.take(), tables));
        drop(pending);

        self.inner.notify.notify_one();
    }

    /// Reports a connectivity change. Regaining connectivity triggers a
    /// full sync so offline edits go out immediately.
    pub fn set_connected(&self, connected: bool) {
        let was_connected = self.inner.connected.swap(connected, Ordering::SeqCst);
        if connected && !was_connected {
            tracing::debug!("connectivity regained, requesting sync");
            self.request_sync(None);
        }
    }

    /// Returns the last reported connectivity state.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Stops the driver loop and cancels the in-flight cycle.
    ///
    /// Cancellation lands at a safe boundary: mid-push leaves affected
    /// records dirty for retry, mid-pull stops at the last committed
    /// page.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.engine.cancel();
        self.inner.notify.notify_one();
    }

    fn take_pending(&self) -> Option<Pending> {
        self.inner.pending.lock().take()
    }

    fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Drives the scheduler until [`shutdown`](SyncScheduler::shutdown).
    ///
    /// This is the single cycle driver; spawn it once per process.
    pub async fn run(&self) {
        let period = self.inner.engine.config().sync_interval;
        let mut ticker = period.map(|p| tokio::time::interval_at(tokio::time::Instant::now() + p, p));

        loop {
            if self.is_shut_down() {
                break;
            }

            match ticker.as_mut() {
                Some(ticker) => {
                    tokio::select! {
                        _ = self.inner.notify.notified() => {}
                        _ = ticker.tick() => {
                            if self.is_connected() {
                                let mut pending = self.inner.pending.lock();
                                *pending = Some(Pending::merge(pending.take(), None));
                            }
                        }
                    }
                }
                None => self.inner.notify.notified().await,
            }

            // Drain: a request made during a cycle re-runs immediately,
            // picking up mutations made while the cycle was in flight.
            while let Some(pending) = self.take_pending() {
                if self.is_shut_down() {
                    break;
                }

                let only = match pending {
                    Pending::All => None,
                    Pending::Tables(set) => Some(set.into_iter().collect::<Vec<_>>()),
                };

                match self.inner.engine.sync_with_retry(only.as_deref()).await {
                    Ok(report) => {
                        tracing::debug!(success = report.success(), "scheduled cycle finished");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "scheduled cycle aborted");
                    }
                }
            }
        }
    }
}
