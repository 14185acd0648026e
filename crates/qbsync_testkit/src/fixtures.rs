//! Test fixtures and payload helpers.
//!
//! Provides maindata-shaped JSON payloads and helpers to turn them into
//! decoded deltas.

use qbsync_protocol::Delta;
use serde_json::{json, Map, Value};

/// A torrent record with the fields most tests care about.
pub fn torrent_json(name: &str, progress: f64) -> Value {
    let state = if progress >= 1.0 {
        "uploading"
    } else {
        "downloading"
    };
    json!({
        "name": name,
        "progress": progress,
        "state": state,
        "size": 1_048_576,
        "dlspeed": 0,
        "upspeed": 0,
        "category": "",
        "tags": "",
    })
}

/// A category record.
pub fn category_json(name: &str, save_path: &str) -> Value {
    json!({ "name": name, "savePath": save_path })
}

/// Builds a full-update payload from `(hash, record)` pairs.
pub fn full_update_json(rid: u64, torrents: &[(&str, Value)]) -> Value {
    json!({
        "rid": rid,
        "full_update": true,
        "torrents": to_object(torrents),
        "categories": {},
        "tags": [],
        "trackers": {},
        "server_state": {
            "connection_status": "connected",
            "dl_info_speed": 0,
            "up_info_speed": 0,
        },
    })
}

/// Builds an incremental payload from `(hash, partial record)` pairs and
/// removed hashes.
pub fn incremental_json(rid: u64, torrents: &[(&str, Value)], removed: &[&str]) -> Value {
    let mut payload = Map::new();
    payload.insert("rid".into(), json!(rid));
    if !torrents.is_empty() {
        payload.insert("torrents".into(), to_object(torrents));
    }
    if !removed.is_empty() {
        payload.insert("torrents_removed".into(), json!(removed));
    }
    Value::Object(payload)
}

/// Decodes a payload, panicking on structural errors.
pub fn delta_from_json(payload: &Value) -> Delta {
    Delta::from_value(payload).expect("fixture payload must decode")
}

fn to_object(entries: &[(&str, Value)]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    )
}
