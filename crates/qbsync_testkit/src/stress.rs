//! Stress tests for the snapshot store.
//!
//! These tests verify that readers never observe a partially applied delta
//! while a writer reconciles concurrently.

use qbsync_engine::{apply_delta, DeletionPolicy, SnapshotStore};
use qbsync_protocol::{Delta, TorrentPatch};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of deltas the writer applies.
    pub operations: usize,
    /// Number of concurrent reader threads.
    pub threads: usize,
    /// Number of torrents touched by every delta.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            entity_count: 64,
        }
    }
}

impl StressConfig {
    /// A short run suitable for unit tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 200,
            threads: 4,
            entity_count: 16,
        }
    }
}

fn stamped_delta(rid: u64, entity_count: usize) -> Delta {
    let mut delta = if rid == 1 {
        Delta::full(rid)
    } else {
        Delta::incremental(rid)
    };
    for i in 0..entity_count {
        let patch = TorrentPatch {
            progress: Some(rid as f64),
            ..TorrentPatch::default()
        };
        delta = delta.with_torrent(format!("{i:040x}"), patch);
    }
    delta
}

/// Applies a stream of deltas while readers check snapshot consistency.
///
/// Every delta stamps each torrent's progress with its own response
/// identifier, so a reader seeing a progress that differs from the
/// snapshot's `response_id` caught a torn read. Reader checks are the
/// counted operations; torn reads count as failures.
pub fn stress_concurrent_reads(store: Arc<SnapshotStore>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let start = Instant::now();

    let readers: Vec<_> = (0..config.threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let done = Arc::clone(&done);

            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let consistent = store.with_snapshot(|snapshot| {
                        let stamp = snapshot.response_id as f64;
                        snapshot.torrents.values().all(|t| t.progress == stamp)
                    });
                    if consistent {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for rid in 1..=config.operations as u64 {
        apply_delta(
            &store,
            stamped_delta(rid, config.entity_count),
            DeletionPolicy::Apply,
        );
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        if reader.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Applies `config.operations` deltas on the calling thread.
pub fn stress_sequential_applies(store: &SnapshotStore, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for rid in 1..=config.operations as u64 {
        let report = apply_delta(
            store,
            stamped_delta(rid, config.entity_count),
            DeletionPolicy::Apply,
        );
        if report.response_id == rid {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}
