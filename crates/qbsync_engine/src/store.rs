//! Snapshot store.
//!
//! The store owns the canonical [`Snapshot`] behind a single readers-writer
//! lock. Every accessor hands out an owned copy; nothing returned by the store
//! aliases its internal state.

use parking_lot::{RwLock, RwLockWriteGuard};
use qbsync_protocol::{Category, Keyed, ServerState, Torrent};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

/// The reconstructed state of the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Response identifier of the last applied delta.
    pub response_id: u64,
    /// Whether the last applied delta replaced the whole state.
    pub full_update: bool,
    /// Torrents by info-hash.
    pub torrents: BTreeMap<String, Torrent>,
    /// Categories by name.
    pub categories: BTreeMap<String, Category>,
    /// Tag names.
    pub tags: BTreeSet<String>,
    /// Tracker URL to the hashes of the torrents using it.
    pub trackers: BTreeMap<String, Vec<String>>,
    /// Global transfer and connection state.
    pub server_state: ServerState,
}

/// A record kind held in a keyed collection of the snapshot.
pub trait Entity: Keyed {
    /// Returns the collection holding records of this kind.
    fn collection(snapshot: &Snapshot) -> &BTreeMap<String, Self>;

    /// Returns the collection holding records of this kind, mutably.
    fn collection_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<String, Self>;
}

impl Entity for Torrent {
    fn collection(snapshot: &Snapshot) -> &BTreeMap<String, Self> {
        &snapshot.torrents
    }

    fn collection_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<String, Self> {
        &mut snapshot.torrents
    }
}

impl Entity for Category {
    fn collection(snapshot: &Snapshot) -> &BTreeMap<String, Self> {
        &snapshot.categories
    }

    fn collection_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<String, Self> {
        &mut snapshot.categories
    }
}

/// Keys reported as removed while deletion lists are retained.
///
/// Cleared by every full update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovedKeys {
    /// Removed torrent hashes.
    pub torrents: BTreeSet<String>,
    /// Removed category names.
    pub categories: BTreeSet<String>,
    /// Removed tag names.
    pub tags: BTreeSet<String>,
    /// Removed tracker URLs.
    pub trackers: BTreeSet<String>,
}

impl RemovedKeys {
    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
            && self.categories.is_empty()
            && self.tags.is_empty()
            && self.trackers.is_empty()
    }
}

/// Everything guarded by the store lock.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) snapshot: Snapshot,
    pub(crate) removed: RemovedKeys,
    last_sync: Option<SystemTime>,
    last_duration: Option<Duration>,
}

/// Thread-safe holder of the current snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    state: RwLock<StoreState>,
}

impl SnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the write lock for a reconciliation.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write()
    }

    /// Records the completion of a successful cycle.
    pub(crate) fn record_sync(&self, at: SystemTime, duration: Duration) {
        let mut state = self.state.write();
        state.last_sync = Some(at);
        state.last_duration = Some(duration);
    }

    /// Runs `f` against the live snapshot under the read lock.
    ///
    /// Useful for cheap aggregate queries; keep `f` short, it blocks writers.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.state.read().snapshot)
    }

    /// Returns a copy of the whole snapshot.
    pub fn current_snapshot(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    /// Returns the response identifier to use as the next cursor.
    pub fn response_id(&self) -> u64 {
        self.state.read().snapshot.response_id
    }

    /// Returns a copy of the record stored under `key`.
    pub fn entity<E: Entity>(&self, key: &str) -> Option<E> {
        E::collection(&self.state.read().snapshot).get(key).cloned()
    }

    /// Returns a copy of every record of kind `E`.
    pub fn entities<E: Entity>(&self) -> BTreeMap<String, E> {
        E::collection(&self.state.read().snapshot).clone()
    }

    /// Returns a copy of the torrent with the given hash.
    pub fn torrent(&self, hash: &str) -> Option<Torrent> {
        self.entity(hash)
    }

    /// Returns a copy of every torrent.
    pub fn torrents(&self) -> BTreeMap<String, Torrent> {
        self.entities()
    }

    /// Returns a copy of the category with the given name.
    pub fn category(&self, name: &str) -> Option<Category> {
        self.entity(name)
    }

    /// Returns a copy of every category.
    pub fn categories(&self) -> BTreeMap<String, Category> {
        self.entities()
    }

    /// Returns a copy of the tag set.
    pub fn tags(&self) -> BTreeSet<String> {
        self.state.read().snapshot.tags.clone()
    }

    /// Returns a copy of the tracker map.
    pub fn trackers(&self) -> BTreeMap<String, Vec<String>> {
        self.state.read().snapshot.trackers.clone()
    }

    /// Returns a copy of the server state.
    pub fn server_state(&self) -> ServerState {
        self.state.read().snapshot.server_state.clone()
    }

    /// Returns the keys recorded while deletion lists are retained.
    pub fn removed_keys(&self) -> RemovedKeys {
        self.state.read().removed.clone()
    }

    /// Wall-clock time of the last successful cycle.
    pub fn last_sync_timestamp(&self) -> Option<SystemTime> {
        self.state.read().last_sync
    }

    /// Round-trip time of the last successful fetch.
    pub fn last_sync_duration(&self) -> Option<Duration> {
        self.state.read().last_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SnapshotStore {
        let store = SnapshotStore::new();
        {
            let mut state = store.write();
            state.snapshot.response_id = 5;
            state.snapshot.torrents.insert(
                "abc".into(),
                Torrent {
                    hash: "abc".into(),
                    name: "T".into(),
                    progress: 0.5,
                    ..Torrent::default()
                },
            );
            state.snapshot.categories.insert(
                "linux".into(),
                Category {
                    name: "linux".into(),
                    save_path: "/srv".into(),
                },
            );
            state.snapshot.tags.insert("iso".into());
        }
        store
    }

    #[test]
    fn empty_store() {
        let store = SnapshotStore::new();
        assert_eq!(store.response_id(), 0);
        assert_eq!(store.current_snapshot(), Snapshot::default());
        assert!(store.torrents().is_empty());
        assert!(store.last_sync_timestamp().is_none());
        assert!(store.last_sync_duration().is_none());
        assert!(store.removed_keys().is_empty());
    }

    #[test]
    fn typed_and_generic_accessors_agree() {
        let store = seeded();
        assert_eq!(store.torrent("abc"), store.entity::<Torrent>("abc"));
        assert_eq!(store.categories(), store.entities::<Category>());
        assert_eq!(store.category("linux").unwrap().save_path, "/srv");
        assert!(store.torrent("ABC").is_none());
    }

    #[test]
    fn returned_copies_are_isolated() {
        let store = seeded();

        let mut snapshot = store.current_snapshot();
        snapshot.torrents.get_mut("abc").unwrap().name = "mutated".into();
        snapshot.tags.clear();
        snapshot.response_id = 99;

        let mut torrent = store.torrent("abc").unwrap();
        torrent.progress = 1.0;

        let mut torrents = store.torrents();
        torrents.clear();

        let fresh = store.current_snapshot();
        assert_eq!(fresh.torrents["abc"].name, "T");
        assert_eq!(fresh.torrents["abc"].progress, 0.5);
        assert_eq!(fresh.tags.len(), 1);
        assert_eq!(fresh.response_id, 5);
    }

    #[test]
    fn record_sync_updates_timestamps() {
        let store = SnapshotStore::new();
        let at = SystemTime::now();
        store.record_sync(at, Duration::from_millis(120));
        assert_eq!(store.last_sync_timestamp(), Some(at));
        assert_eq!(store.last_sync_duration(), Some(Duration::from_millis(120)));
    }

    #[test]
    fn with_snapshot_reads_live_state() {
        let store = seeded();
        let count = store.with_snapshot(|s| s.torrents.len() + s.categories.len());
        assert_eq!(count, 2);
    }
}
