//! # qbsync Engine
//!
//! Incremental merge engine and adaptive poll scheduler for the qBittorrent
//! `sync/maindata` API.
//!
//! This crate provides:
//! - Snapshot store with copy-on-read accessors
//! - Delta reconciliation (full replacement, partial merge, deletion lists)
//! - Fixed and adaptive-with-jitter poll intervals
//! - A single-worker poll loop with update/error callbacks
//! - Transport abstraction, a scripted mock and an HTTP adapter
//!
//! ## Architecture
//!
//! Each cycle fetches the delta after the current response identifier,
//! reconciles it into the store under one write lock, then hands a copy of
//! the new snapshot to the update callback:
//!
//! ```text
//! Poller ──fetch(rid)──▶ DeltaTransport ──Delta──▶ apply_delta ──▶ SnapshotStore
//!    ▲                                                                   │
//!    └──────── sleep(next_interval(duration)) ◀── on_update(Snapshot) ◀──┘
//! ```
//!
//! ## Key Invariants
//!
//! - At most one fetch is outstanding; deltas apply in fetch order
//! - Readers see the snapshot before or after a delta, never in between
//! - Fields absent from a delta keep their previous value
//! - The server's response identifier is taken verbatim
//! - Failed cycles never modify the store and never stop the loop

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod poller;
mod reconcile;
mod schedule;
mod store;
mod transport;

pub use config::{ErrorCallback, SyncConfig, UpdateCallback};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, MAINDATA_PATH};
pub use poller::{CycleOutcome, Poller, SyncStats};
pub use reconcile::{apply_delta, ApplyReport, DeletionPolicy};
pub use schedule::IntervalPolicy;
pub use store::{Entity, RemovedKeys, Snapshot, SnapshotStore};
pub use transport::{DeltaTransport, MockTransport};

pub use qbsync_protocol::{Category, Delta, ServerState, Torrent};
