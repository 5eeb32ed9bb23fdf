//! The boundary to the authoritative backend.

use crate::error::SyncResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use rosterbase_protocol::{Cursor, PullPage, PushOutcome, RemoteRecord};
use std::collections::VecDeque;

/// Abstraction over the remote backend's per-table sync endpoints.
///
/// This is a pure I/O boundary with no policy: implementations translate
/// the two calls onto the host application's existing authenticated
/// transport and map failures into the sync error taxonomy
/// (network/timeouts to [`SyncError::Transient`], invalid payloads to
/// [`SyncError::Permanent`]).
///
/// # Contract
///
/// - `push` is idempotent on `(id, updatedAt)`: pushing the same record
///   twice with the same timestamp is a no-op on the server.
/// - `pull` returns a strictly-ordered, cursor-resumable page; replaying
///   a page after a crash must not produce duplicate-application errors.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Pushes a batch of records (deletions travel as deletion rows).
    async fn push(&self, table: &str, records: Vec<RemoteRecord>) -> SyncResult<PushOutcome>;

    /// Pulls one page of remote changes after the given cursor.
    async fn pull(&self, table: &str, cursor: Cursor, limit: usize) -> SyncResult<PullPage>;
}

/// A scripted gateway for testing.
///
/// Responses are queued per call; when a queue is empty the mock answers
/// with a benign default (accept everything, pull nothing). All calls are
/// recorded for inspection.
#[derive(Default)]
pub struct MockGateway {
    push_responses: Mutex<VecDeque<SyncResult<PushOutcome>>>,
    pull_responses: Mutex<VecDeque<SyncResult<PullPage>>>,
    pushes: Mutex<Vec<(String, Vec<RemoteRecord>)>>,
    pulls: Mutex<Vec<(String, Cursor, usize)>>,
}

impl MockGateway {
    /// Creates a new mock gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a push response.
    pub fn enqueue_push(&self, response: SyncResult<PushOutcome>) {
        self.push_responses.lock().push_back(response);
    }

    /// Queues a pull response.
    pub fn enqueue_pull(&self, response: SyncResult<PullPage>) {
        self.pull_responses.lock().push_back(response);
    }

    /// Returns all recorded push calls.
    #[must_use]
    pub fn pushes(&self) -> Vec<(String, Vec<RemoteRecord>)> {
        self.pushes.lock().clone()
    }

    /// Returns all recorded pull calls.
    #[must_use]
    pub fn pulls(&self) -> Vec<(String, Cursor, usize)> {
        self.pulls.lock().clone()
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn push(&self, table: &str, records: Vec<RemoteRecord>) -> SyncResult<PushOutcome> {
        let ids: Vec<_> = records.iter().map(|r| r.id).collect();
        self.pushes.lock().push((table.to_string(), records));

        match self.push_responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(PushOutcome::accepted_all(ids)),
        }
    }

    async fn pull(&self, table: &str, cursor: Cursor, limit: usize) -> SyncResult<PullPage> {
        self.pulls.lock().push((table.to_string(), cursor, limit));

        match self.pull_responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(PullPage::empty(cursor)),
        }
    }
}
