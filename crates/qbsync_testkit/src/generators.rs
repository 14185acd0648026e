//! Property-based test generators using proptest.
//!
//! Provides strategies for generating wire records and cycle scripts that
//! stay within the shapes the Web API actually serves.

use proptest::prelude::*;
use qbsync_protocol::TorrentPatch;
use serde_json::{json, Map, Value};

/// Strategy for generating info hashes (40 lowercase hex digits).
pub fn hash_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{40}").expect("Invalid regex")
}

/// Strategy for generating a small pool of distinct hashes.
pub fn hash_pool_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(hash_strategy(), 1..max.max(2))
        .prop_map(|set| set.into_iter().collect())
}

/// Strategy for generating torrent names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9 ._-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating partial torrent patches.
pub fn torrent_patch_strategy() -> impl Strategy<Value = TorrentPatch> {
    (
        prop::option::of(name_strategy()),
        prop::option::of(0.0f64..=1.0),
        prop::option::of(0i64..1 << 40),
        prop::option::of(0i64..1 << 24),
        prop::option::of(prop::sample::select(vec!["downloading", "uploading", "pausedDL"])),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(name, progress, size, dlspeed, state, seq_dl)| TorrentPatch {
            name,
            progress,
            size,
            dlspeed,
            state: state.map(str::to_string),
            seq_dl,
            ..TorrentPatch::default()
        })
}

/// Strategy for generating partial torrent records as wire JSON.
pub fn torrent_json_strategy() -> impl Strategy<Value = Value> {
    (
        prop::option::of(name_strategy()),
        prop::option::of(0.0f64..=1.0),
        prop::option::of(0i64..1 << 40),
        prop::option::of(0i64..1 << 24),
    )
        .prop_map(|(name, progress, size, upspeed)| {
            let mut fields = Map::new();
            if let Some(name) = name {
                fields.insert("name".into(), json!(name));
            }
            if let Some(progress) = progress {
                fields.insert("progress".into(), json!(progress));
            }
            if let Some(size) = size {
                fields.insert("size".into(), json!(size));
            }
            if let Some(upspeed) = upspeed {
                fields.insert("upspeed".into(), json!(upspeed));
            }
            Value::Object(fields)
        })
}

/// One step of a scripted server history.
#[derive(Debug, Clone)]
pub enum ServerOperation {
    /// Merge fields into a torrent
    Upsert {
        /// Index into the hash pool
        slot: usize,
        /// Fields to merge
        fields: Value,
    },
    /// Remove a torrent
    Remove {
        /// Index into the hash pool
        slot: usize,
    },
    /// Let the client poll
    Poll,
}

/// Strategy for generating server operations against a pool of `slots` hashes.
pub fn server_operation_strategy(slots: usize) -> impl Strategy<Value = ServerOperation> {
    let slots = slots.max(1);
    prop_oneof![
        3 => (0..slots, torrent_json_strategy())
            .prop_map(|(slot, fields)| ServerOperation::Upsert { slot, fields }),
        1 => (0..slots).prop_map(|slot| ServerOperation::Remove { slot }),
        2 => Just(ServerOperation::Poll),
    ]
}

/// Strategy for generating a sequence of server operations.
pub fn operation_sequence_strategy(
    slots: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ServerOperation>> {
    prop::collection::vec(server_operation_strategy(slots), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
