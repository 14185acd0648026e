//! Transport layer abstraction for delta fetches.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use qbsync_protocol::Delta;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A delta transport performs the network call to the sync endpoint.
///
/// Timeouts, authentication and session handling belong to implementations;
/// the engine only measures how long the call took.
pub trait DeltaTransport: Send + Sync {
    /// Fetches the changes since response identifier `rid`.
    fn fetch_delta(&self, rid: u64) -> SyncResult<Delta>;
}

impl<T: DeltaTransport + ?Sized> DeltaTransport for Arc<T> {
    fn fetch_delta(&self, rid: u64) -> SyncResult<Delta> {
        (**self).fetch_delta(rid)
    }
}

impl<T: DeltaTransport + ?Sized> DeltaTransport for Box<T> {
    fn fetch_delta(&self, rid: u64) -> SyncResult<Delta> {
        (**self).fetch_delta(rid)
    }
}

/// A scripted transport for testing.
///
/// Queued results are returned in order. Once the queue is empty every fetch
/// returns an empty incremental delta echoing the requested cursor.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    responses: Mutex<VecDeque<SyncResult<Delta>>>,
    cursors: Mutex<Vec<u64>>,
    latency: Mutex<Duration>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues a successful response.
    pub fn push_delta(&self, delta: Delta) {
        self.responses.lock().push_back(Ok(delta));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: SyncError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Makes every fetch block for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the cursors passed to every fetch so far.
    pub fn requested_cursors(&self) -> Vec<u64> {
        self.cursors.lock().clone()
    }

    /// Returns how many queued responses are left.
    pub fn pending(&self) -> usize {
        self.responses.lock().len()
    }
}

impl DeltaTransport for MockTransport {
    fn fetch_delta(&self, rid: u64) -> SyncResult<Delta> {
        self.cursors.lock().push(rid);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Delta::incremental(rid)))
    }
}
