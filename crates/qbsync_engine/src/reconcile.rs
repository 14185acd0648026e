//! Delta reconciliation.
//!
//! Applies one [`Delta`] to a [`SnapshotStore`] under the store's write lock,
//! so readers observe either the state before or after the delta, never a
//! partial merge.

use crate::store::{Entity, RemovedKeys, Snapshot, SnapshotStore, StoreState};
use qbsync_protocol::{Category, Delta, Patch, Torrent};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What to do with the deletion lists of an incremental delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    /// Remove listed keys from the snapshot.
    #[default]
    Apply,
    /// Keep the records and only remember the listed keys.
    Retain,
}

/// Summary of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Response identifier after the delta.
    pub response_id: u64,
    /// Whether the delta replaced the whole state.
    pub full_update: bool,
    /// Records that did not exist before.
    pub created: usize,
    /// Existing records that were merged into.
    pub updated: usize,
    /// Keys actually removed (absent keys are not counted).
    pub removed: usize,
    /// Keys recorded but kept under [`DeletionPolicy::Retain`].
    pub retained: usize,
    /// Fields rejected while decoding the delta.
    pub ignored_fields: usize,
}

/// Applies `delta` to `store`.
///
/// A full update replaces the snapshot with one built from the delta alone
/// and clears retained deletions. An incremental delta merges every patch
/// into the existing or a default record, then processes the deletion lists.
/// The store's response identifier always becomes `delta.rid`; gaps and
/// regressions are accepted as-is.
pub fn apply_delta(store: &SnapshotStore, delta: Delta, policy: DeletionPolicy) -> ApplyReport {
    let report = {
        let mut state = store.write();
        if delta.full_update {
            replace(&mut state, delta)
        } else {
            merge(&mut state, delta, policy)
        }
    };

    debug!(
        rid = report.response_id,
        full_update = report.full_update,
        created = report.created,
        updated = report.updated,
        removed = report.removed,
        retained = report.retained,
        ignored_fields = report.ignored_fields,
        "delta applied"
    );
    report
}

fn replace(state: &mut StoreState, delta: Delta) -> ApplyReport {
    let mut report = ApplyReport {
        response_id: delta.rid,
        full_update: true,
        ignored_fields: delta.ignored.len(),
        ..ApplyReport::default()
    };

    let mut snapshot = Snapshot {
        response_id: delta.rid,
        full_update: true,
        tags: delta.tags.into_iter().collect(),
        trackers: delta.trackers,
        ..Snapshot::default()
    };
    merge_collection::<Torrent, _>(&mut snapshot, delta.torrents, &mut report);
    merge_collection::<Category, _>(&mut snapshot, delta.categories, &mut report);
    if let Some(patch) = delta.server_state {
        patch.apply_to(&mut snapshot.server_state);
    }

    state.snapshot = snapshot;
    state.removed = RemovedKeys::default();
    report
}

fn merge(state: &mut StoreState, delta: Delta, policy: DeletionPolicy) -> ApplyReport {
    let mut report = ApplyReport {
        response_id: delta.rid,
        full_update: false,
        ignored_fields: delta.ignored.len(),
        ..ApplyReport::default()
    };

    let StoreState {
        snapshot, removed, ..
    } = state;

    // A key the server sends again is live, whatever was recorded before.
    forget_keys(&mut removed.torrents, delta.torrents.keys());
    forget_keys(&mut removed.categories, delta.categories.keys());
    forget_keys(&mut removed.tags, delta.tags.iter());
    forget_keys(&mut removed.trackers, delta.trackers.keys());

    merge_collection::<Torrent, _>(snapshot, delta.torrents, &mut report);
    merge_collection::<Category, _>(snapshot, delta.categories, &mut report);
    snapshot.tags.extend(delta.tags);
    snapshot.trackers.extend(delta.trackers);
    if let Some(patch) = delta.server_state {
        patch.apply_to(&mut snapshot.server_state);
    }

    match policy {
        DeletionPolicy::Apply => {
            report.removed += remove_keys(&mut snapshot.torrents, &delta.torrents_removed);
            report.removed += remove_keys(&mut snapshot.categories, &delta.categories_removed);
            report.removed += remove_keys(&mut snapshot.trackers, &delta.trackers_removed);
            for tag in &delta.tags_removed {
                if snapshot.tags.remove(tag) {
                    report.removed += 1;
                }
            }
        }
        DeletionPolicy::Retain => {
            report.retained += retain_keys(&mut removed.torrents, delta.torrents_removed);
            report.retained += retain_keys(&mut removed.categories, delta.categories_removed);
            report.retained += retain_keys(&mut removed.tags, delta.tags_removed);
            report.retained += retain_keys(&mut removed.trackers, delta.trackers_removed);
        }
    }

    snapshot.response_id = delta.rid;
    snapshot.full_update = false;
    report
}

/// Merges `patches` into the collection of `E`, creating default records for
/// new keys. The record's identity field is forced to its key.
fn merge_collection<E, P>(
    snapshot: &mut Snapshot,
    patches: BTreeMap<String, P>,
    report: &mut ApplyReport,
) where
    E: Entity,
    P: Patch<Target = E>,
{
    let collection = E::collection_mut(snapshot);
    for (key, patch) in patches {
        let existed = collection.contains_key(&key);
        let record = collection.entry(key.clone()).or_default();
        patch.apply_to(record);
        record.assign_key(&key);
        if existed {
            report.updated += 1;
        } else {
            report.created += 1;
        }
    }
}

fn remove_keys<V>(collection: &mut BTreeMap<String, V>, keys: &[String]) -> usize {
    keys.iter()
        .filter(|key| collection.remove(key.as_str()).is_some())
        .count()
}

fn forget_keys<'a>(recorded: &mut BTreeSet<String>, keys: impl Iterator<Item = &'a String>) {
    for key in keys {
        recorded.remove(key.as_str());
    }
}

fn retain_keys(recorded: &mut BTreeSet<String>, keys: Vec<String>) -> usize {
    let count = keys.len();
    recorded.extend(keys);
    count
}
