//! Adaptive poll loop.
//!
//! One worker thread repeats fetch, reconcile, callback, sleep. Fetches never
//! overlap: a cycle started through [`Poller::run_once`] while the loop is
//! running waits for the in-flight one.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{apply_delta, ApplyReport};
use crate::schedule::IntervalPolicy;
use crate::store::{Snapshot, SnapshotStore};
use crate::transport::DeltaTransport;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Counters kept across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Cycles that fetched and applied a delta.
    pub cycles_completed: u64,
    /// Cycles whose fetch failed.
    pub cycles_failed: u64,
    /// Failures since the last successful cycle.
    pub consecutive_failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Result of one poll cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Wall-clock time spent in the fetch call.
    pub duration: Duration,
    /// The reconciliation summary, or why the fetch failed.
    pub result: SyncResult<ApplyReport>,
}

impl CycleOutcome {
    /// Returns true if a delta was fetched and applied.
    pub fn fetched(&self) -> bool {
        self.result.is_ok()
    }
}

/// Stop flag the worker sleeps on between cycles.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps for `timeout` or until stopped. Returns true if stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = self.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut stopped),
            }
        }
        *stopped
    }
}

struct Worker {
    handle: JoinHandle<()>,
    signal: Arc<StopSignal>,
}

struct Shared<T> {
    config: SyncConfig,
    policy: IntervalPolicy,
    transport: T,
    store: Arc<SnapshotStore>,
    fetch_lock: Mutex<()>,
    stats: RwLock<SyncStats>,
}

impl<T: DeltaTransport> Shared<T> {
    fn run_once(&self) -> CycleOutcome {
        let (outcome, applied) = {
            let _fetching = self.fetch_lock.lock();
            let cursor = self.store.response_id();
            let started = Instant::now();
            let fetched = self.transport.fetch_delta(cursor);
            let duration = started.elapsed();

            let mut applied = None;
            let result = fetched.map(|delta| {
                let report = apply_delta(&self.store, delta, self.config.deletion_policy());
                self.store.record_sync(SystemTime::now(), duration);
                // Copied before the lock drops so the callback sees this cycle's state.
                if self.config.on_update.is_some() {
                    applied = Some(self.store.current_snapshot());
                }
                report
            });
            (CycleOutcome { duration, result }, applied)
        };

        match &outcome.result {
            Ok(report) => {
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.consecutive_failures = 0;
                }
                debug!(
                    rid = report.response_id,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "sync cycle completed"
                );
                if let (Some(on_update), Some(snapshot)) = (&self.config.on_update, applied) {
                    on_update(snapshot);
                }
            }
            Err(err) => {
                {
                    let mut stats = self.stats.write();
                    stats.cycles_failed += 1;
                    stats.consecutive_failures += 1;
                    stats.last_error = Some(err.to_string());
                }
                warn!(error = %err, retryable = err.is_retryable(), "sync cycle failed");
                if let Some(on_error) = &self.config.on_error {
                    on_error(err);
                }
            }
        }
        outcome
    }
}

fn run_loop<T: DeltaTransport>(shared: Arc<Shared<T>>, signal: Arc<StopSignal>) {
    info!("poll loop started");
    while !signal.is_stopped() {
        let outcome = shared.run_once();
        let wait = shared.policy.next_interval(outcome.duration);
        trace!(wait_ms = wait.as_millis() as u64, "next cycle scheduled");
        if signal.wait(wait) {
            break;
        }
    }
    info!("poll loop stopped");
}

/// Keeps a [`SnapshotStore`] in sync with the remote service.
pub struct Poller<T: DeltaTransport + 'static> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<Worker>>,
}

impl<T: DeltaTransport + 'static> Poller<T> {
    /// Creates a poller, starting the loop if `auto_start` is set.
    pub fn new(config: SyncConfig, transport: T) -> SyncResult<Self> {
        config.validate()?;
        let auto_start = config.auto_start;
        let poller = Self {
            shared: Arc::new(Shared {
                policy: config.interval_policy(),
                config,
                transport,
                store: Arc::new(SnapshotStore::new()),
                fetch_lock: Mutex::new(()),
                stats: RwLock::new(SyncStats::default()),
            }),
            worker: Mutex::new(None),
        };
        if auto_start {
            poller.start()?;
        }
        Ok(poller)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Returns a handle to the store, usable independently of the poller.
    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.shared.store)
    }

    /// Returns a copy of the current snapshot.
    pub fn current_snapshot(&self) -> Snapshot {
        self.shared.store.current_snapshot()
    }

    /// Wall-clock time of the last successful cycle.
    pub fn last_sync_timestamp(&self) -> Option<SystemTime> {
        self.shared.store.last_sync_timestamp()
    }

    /// Round-trip time of the last successful fetch.
    pub fn last_sync_duration(&self) -> Option<Duration> {
        self.shared.store.last_sync_duration()
    }

    /// Returns the cycle counters.
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.read().clone()
    }

    /// Computes the wait that would follow a fetch of `last_duration`.
    pub fn next_interval(&self, last_duration: Duration) -> Duration {
        self.shared.policy.next_interval(last_duration)
    }

    /// Runs a single fetch-and-reconcile cycle on the calling thread.
    ///
    /// A failed fetch leaves the store untouched and is reported through
    /// `on_error` as well as the returned outcome.
    pub fn run_once(&self) -> CycleOutcome {
        self.shared.run_once()
    }

    /// Starts the poll loop. Returns false if it was already running.
    pub fn start(&self) -> SyncResult<bool> {
        let previous = {
            let mut worker = self.worker.lock();
            if let Some(current) = worker.as_ref() {
                if !current.signal.is_stopped() && !current.handle.is_finished() {
                    return Ok(false);
                }
            }
            let previous = worker.take();
            if let Some(previous) = &previous {
                previous.signal.stop();
            }

            let signal = Arc::new(StopSignal::default());
            let shared = Arc::clone(&self.shared);
            let worker_signal = Arc::clone(&signal);
            let handle = thread::Builder::new()
                .name("qbsync-poller".into())
                .spawn(move || run_loop(shared, worker_signal))
                .map_err(|e| SyncError::WorkerSpawn(e.to_string()))?;

            *worker = Some(Worker { handle, signal });
            previous
        };

        // A worker stopped from its own callback may still be finishing.
        if let Some(previous) = previous {
            join_worker(previous);
        }
        Ok(true)
    }

    /// Stops the poll loop.
    ///
    /// An in-flight cycle runs to completion; no further cycle starts. Blocks
    /// until the worker exits, except when called from the worker itself (from
    /// a callback), where it only signals. Safe to call repeatedly or before
    /// [`Poller::start`].
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.signal.stop();
        join_worker(worker);
    }

    /// Returns true while the loop is running and not asked to stop.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.signal.is_stopped() && !w.handle.is_finished())
    }
}

fn join_worker(worker: Worker) {
    if worker.handle.thread().id() == thread::current().id() {
        return;
    }
    if worker.handle.join().is_err() {
        warn!("poll worker panicked");
    }
}

impl<T: DeltaTransport + 'static> Drop for Poller<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use qbsync_protocol::{Delta, TorrentPatch};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_config() -> SyncConfig {
        SyncConfig::new()
            .with_adaptive(false)
            .with_fixed_interval(Duration::from_millis(5))
    }

    fn progress(value: f64) -> TorrentPatch {
        TorrentPatch {
            progress: Some(value),
            ..TorrentPatch::default()
        }
    }

    #[test]
    fn run_once_applies_and_passes_cursor() {
        let transport = Arc::new(MockTransport::new());
        transport.push_delta(Delta::full(1).with_torrent("abc", progress(0.5)));
        transport.push_delta(Delta::incremental(2).with_torrent("abc", progress(0.75)));

        let poller = Poller::new(quick_config(), Arc::clone(&transport)).unwrap();

        let first = poller.run_once();
        assert!(first.fetched());
        let second = poller.run_once();
        assert!(second.fetched());

        assert_eq!(transport.requested_cursors(), vec![0, 1]);
        let snapshot = poller.current_snapshot();
        assert_eq!(snapshot.response_id, 2);
        assert_eq!(snapshot.torrents["abc"].progress, 0.75);
        assert!(poller.last_sync_timestamp().is_some());
        assert!(poller.last_sync_duration().is_some());
        assert_eq!(poller.stats().cycles_completed, 2);
    }

    #[test]
    fn failure_leaves_store_untouched() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let config = quick_config().with_on_error(move |err| {
            assert!(matches!(err, SyncError::Timeout));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let transport = MockTransport::new();
        transport.push_delta(Delta::full(1).with_torrent("abc", progress(0.5)));
        transport.push_error(SyncError::Timeout);
        let poller = Poller::new(config, transport).unwrap();

        poller.run_once();
        let before = poller.current_snapshot();
        let last_sync = poller.last_sync_timestamp();

        let outcome = poller.run_once();
        assert!(!outcome.fetched());
        assert_eq!(poller.current_snapshot(), before);
        assert_eq!(poller.last_sync_timestamp(), last_sync);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        let stats = poller.stats();
        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.last_error.as_deref(), Some("operation timed out"));
    }

    #[test]
    fn on_update_receives_copy() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let config = quick_config().with_on_update(move |mut snapshot: Snapshot| {
            snapshot.torrents.clear();
            sink.lock().push(snapshot.response_id);
        });

        let transport = MockTransport::new();
        transport.push_delta(Delta::full(3).with_torrent("abc", progress(0.1)));
        let poller = Poller::new(config, transport).unwrap();
        poller.run_once();

        assert_eq!(*received.lock(), vec![3]);
        assert!(poller.store().torrent("abc").is_some());
    }

    #[test]
    fn concurrent_cycles_each_report_their_own_snapshot() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let config = quick_config().with_on_update(move |snapshot: Snapshot| {
            // Widen the window between releasing the fetch lock and reporting.
            thread::sleep(Duration::from_millis(2));
            sink.lock().push(snapshot.response_id);
        });

        let transport = MockTransport::new();
        transport.set_latency(Duration::from_millis(3));
        for rid in 1..=8 {
            transport.push_delta(Delta::incremental(rid).with_torrent("abc", progress(0.1)));
        }
        let poller = Arc::new(Poller::new(config, transport).unwrap());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let poller = Arc::clone(&poller);
                thread::spawn(move || {
                    (0..2)
                        .map(|_| poller.run_once().result.unwrap().response_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut reported: Vec<u64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();

        let mut received = received.lock().clone();
        reported.sort_unstable();
        received.sort_unstable();
        assert_eq!(reported, (1..=8).collect::<Vec<_>>());
        assert_eq!(received, reported);
    }

    #[test]
    fn cycle_duration_covers_transport_latency() {
        let transport = MockTransport::new();
        transport.set_latency(Duration::from_millis(20));
        transport.push_delta(Delta::full(1));
        let poller = Poller::new(quick_config(), transport).unwrap();

        let outcome = poller.run_once();
        assert!(outcome.duration >= Duration::from_millis(20));
        assert_eq!(poller.last_sync_duration(), Some(outcome.duration));
    }

    #[test]
    fn stop_before_start_is_noop() {
        let poller = Poller::new(quick_config(), MockTransport::new()).unwrap();
        poller.stop();
        poller.stop();
        assert!(!poller.is_running());
    }

    #[test]
    fn start_is_idempotent_and_stop_halts_cycles() {
        let transport = Arc::new(MockTransport::new());
        let poller = Poller::new(quick_config(), Arc::clone(&transport)).unwrap();

        assert!(poller.start().unwrap());
        assert!(!poller.start().unwrap());
        assert!(poller.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while transport.requested_cursors().len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        poller.stop();
        assert!(!poller.is_running());

        let fetched = transport.requested_cursors().len();
        assert!(fetched >= 3);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.requested_cursors().len(), fetched);

        assert!(poller.start().unwrap());
        poller.stop();
    }

    #[test]
    fn auto_start_runs_without_explicit_start() {
        let transport = Arc::new(MockTransport::new());
        transport.push_delta(Delta::full(1));
        let poller = Poller::new(
            quick_config().with_auto_start(true),
            Arc::clone(&transport),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while poller.store().response_id() != 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(poller.store().response_id(), 1);
        drop(poller);
        let fetched = transport.requested_cursors().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(transport.requested_cursors().len(), fetched);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SyncConfig::new().with_jitter_percent(150);
        assert!(matches!(
            Poller::new(config, MockTransport::new()),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stop_signal_wakes_sleeper() {
        let signal = Arc::new(StopSignal::default());
        let sleeper = Arc::clone(&signal);
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.wait(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));

        let idle = StopSignal::default();
        assert!(!idle.wait(Duration::from_millis(1)));
    }
}
