//! A simulated Web API server.
//!
//! Holds records as raw JSON objects and answers `fetch_delta` the way the
//! real endpoint does: a full update for an unknown cursor, otherwise only the
//! fields that changed since the state served at that cursor.

use parking_lot::Mutex;
use qbsync_engine::{DeltaTransport, SyncError, SyncResult};
use qbsync_protocol::{Delta, Keyed, Patch, Torrent, TorrentPatch};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

type Records = BTreeMap<String, Map<String, Value>>;

/// Number of served states kept for computing deltas.
const HISTORY: usize = 16;

#[derive(Debug, Clone, Default)]
struct State {
    torrents: Records,
    categories: Records,
    tags: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    rid: u64,
    current: State,
    served: BTreeMap<u64, State>,
    failures: VecDeque<String>,
    latency: Duration,
    requests: u64,
}

/// In-memory stand-in for the remote service.
#[derive(Debug, Default)]
pub struct SimulatedServer {
    inner: Mutex<Inner>,
}

impl SimulatedServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `fields` into the torrent `hash`, creating it if needed.
    pub fn upsert_torrent(&self, hash: &str, fields: Value) {
        upsert(&mut self.inner.lock().current.torrents, hash, fields);
    }

    /// Removes a torrent.
    pub fn remove_torrent(&self, hash: &str) {
        self.inner.lock().current.torrents.remove(hash);
    }

    /// Merges `fields` into the category `name`, creating it if needed.
    pub fn upsert_category(&self, name: &str, fields: Value) {
        upsert(&mut self.inner.lock().current.categories, name, fields);
    }

    /// Removes a category.
    pub fn remove_category(&self, name: &str) {
        self.inner.lock().current.categories.remove(name);
    }

    /// Adds a tag.
    pub fn add_tag(&self, tag: &str) {
        self.inner.lock().current.tags.insert(tag.to_string());
    }

    /// Removes a tag.
    pub fn remove_tag(&self, tag: &str) {
        self.inner.lock().current.tags.remove(tag);
    }

    /// Makes the next fetch fail with a retryable transport error.
    pub fn fail_next(&self, message: &str) {
        self.inner.lock().failures.push_back(message.to_string());
    }

    /// Makes every fetch take at least `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    /// Returns the last response identifier handed out.
    pub fn rid(&self) -> u64 {
        self.inner.lock().rid
    }

    /// Returns how many fetches were answered, failed ones included.
    pub fn requests(&self) -> u64 {
        self.inner.lock().requests
    }

    /// Returns the torrents a fully synced client should hold.
    pub fn expected_torrents(&self) -> BTreeMap<String, Torrent> {
        let inner = self.inner.lock();
        inner
            .current
            .torrents
            .iter()
            .map(|(hash, fields)| {
                let (patch, _) = TorrentPatch::from_wire(hash, fields);
                let mut torrent = Torrent::default();
                patch.apply_to(&mut torrent);
                torrent.assign_key(hash);
                (hash.clone(), torrent)
            })
            .collect()
    }

    /// Returns the tags a fully synced client should hold.
    pub fn expected_tags(&self) -> BTreeSet<String> {
        self.inner.lock().current.tags.clone()
    }

    /// Produces the payload for cursor `rid` and records it as served.
    pub fn payload(&self, rid: u64) -> Value {
        let mut inner = self.inner.lock();
        let payload = match inner.served.get(&rid) {
            Some(known) if rid != 0 => diff_payload(known, &inner.current),
            _ => full_payload(&inner.current),
        };

        inner.rid += 1;
        let next = inner.rid;
        let current = inner.current.clone();
        inner.served.insert(next, current);
        while inner.served.len() > HISTORY {
            inner.served.pop_first();
        }

        let mut payload = payload;
        payload.insert("rid".into(), json!(next));
        Value::Object(payload)
    }
}

impl DeltaTransport for SimulatedServer {
    fn fetch_delta(&self, rid: u64) -> SyncResult<Delta> {
        let (latency, failure) = {
            let mut inner = self.inner.lock();
            inner.requests += 1;
            (inner.latency, inner.failures.pop_front())
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if let Some(message) = failure {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(Delta::from_value(&self.payload(rid))?)
    }
}

fn upsert(records: &mut Records, key: &str, fields: Value) {
    let Value::Object(fields) = fields else {
        panic!("record fields must be a JSON object");
    };
    records.entry(key.to_string()).or_default().extend(fields);
}

fn full_payload(state: &State) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("full_update".into(), json!(true));
    payload.insert("torrents".into(), records_json(&state.torrents));
    payload.insert("categories".into(), records_json(&state.categories));
    payload.insert("tags".into(), json!(state.tags));
    payload.insert("trackers".into(), json!({}));
    payload.insert(
        "server_state".into(),
        json!({"connection_status": "connected"}),
    );
    payload
}

fn diff_payload(old: &State, new: &State) -> Map<String, Value> {
    let mut payload = Map::new();

    let (changed, removed) = diff_records(&old.torrents, &new.torrents);
    if !changed.is_empty() {
        payload.insert("torrents".into(), Value::Object(changed));
    }
    if !removed.is_empty() {
        payload.insert("torrents_removed".into(), json!(removed));
    }

    let (changed, removed) = diff_records(&old.categories, &new.categories);
    if !changed.is_empty() {
        payload.insert("categories".into(), Value::Object(changed));
    }
    if !removed.is_empty() {
        payload.insert("categories_removed".into(), json!(removed));
    }

    let added: Vec<&String> = new.tags.difference(&old.tags).collect();
    if !added.is_empty() {
        payload.insert("tags".into(), json!(added));
    }
    let removed: Vec<&String> = old.tags.difference(&new.tags).collect();
    if !removed.is_empty() {
        payload.insert("tags_removed".into(), json!(removed));
    }
    payload
}

fn diff_records(old: &Records, new: &Records) -> (Map<String, Value>, Vec<String>) {
    let mut changed = Map::new();
    for (key, fields) in new {
        let Some(before) = old.get(key) else {
            // New records are sent even without fields so the client creates them.
            changed.insert(key.clone(), Value::Object(fields.clone()));
            continue;
        };
        let partial: Map<String, Value> = fields
            .iter()
            .filter(|(name, value)| before.get(name.as_str()) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !partial.is_empty() {
            changed.insert(key.clone(), Value::Object(partial));
        }
    }
    let removed = old
        .keys()
        .filter(|key| !new.contains_key(key.as_str()))
        .cloned()
        .collect();
    (changed, removed)
}

fn records_json(records: &Records) -> Value {
    Value::Object(
        records
            .iter()
            .map(|(key, fields)| (key.clone(), Value::Object(fields.clone())))
            .collect(),
    )
}
