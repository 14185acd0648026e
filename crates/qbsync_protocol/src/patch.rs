//! Partial-update records and their merge rules.
//!
//! Each patch mirrors one record with every field wrapped in `Option`:
//! `Some` overwrites the record field, `None` leaves it untouched. `apply_to`
//! destructures the patch without a rest pattern, so a field added to a patch
//! without a merge rule does not compile.

use crate::coerce::FromWire;
use crate::error::FieldIssue;
use crate::records::{Category, Record, ServerState, Torrent};
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::{trace, warn};

/// A partial update to a record of type [`Patch::Target`].
pub trait Patch: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// The record this patch merges into.
    type Target: Record;

    /// Decodes a patch from the wire representation of one record.
    ///
    /// Fields with unusable values are skipped and returned as issues; unknown
    /// fields are ignored.
    fn from_wire(key: &str, fields: &Map<String, Value>) -> (Self, Vec<FieldIssue>);

    /// Merges this patch into `target`, leaving absent fields untouched.
    fn apply_to(self, target: &mut Self::Target);
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Reads typed fields out of one wire object and collects rejections.
struct FieldReader<'a> {
    collection: &'static str,
    key: &'a str,
    fields: &'a Map<String, Value>,
    issues: Vec<FieldIssue>,
}

impl<'a> FieldReader<'a> {
    fn new(collection: &'static str, key: &'a str, fields: &'a Map<String, Value>) -> Self {
        Self {
            collection,
            key,
            fields,
            issues: Vec::new(),
        }
    }

    fn read<T: FromWire>(&mut self, field: &str) -> Option<T> {
        let value = self.fields.get(field)?;
        if value.is_null() {
            return None;
        }
        match T::from_wire(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    collection = self.collection,
                    key = self.key,
                    field,
                    error = %e,
                    "ignoring malformed field"
                );
                self.issues.push(FieldIssue {
                    collection: self.collection,
                    key: self.key.to_string(),
                    field: field.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn finish(self, known: &[&str]) -> Vec<FieldIssue> {
        for name in self.fields.keys() {
            if !known.contains(&name.as_str()) {
                trace!(collection = self.collection, field = %name, "unknown field");
            }
        }
        self.issues
    }
}

/// Partial update for a [`Torrent`].
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct TorrentPatch {
    pub added_on: Option<i64>,
    pub amount_left: Option<i64>,
    pub auto_tmm: Option<bool>,
    pub availability: Option<f64>,
    pub category: Option<String>,
    pub completed: Option<i64>,
    pub completion_on: Option<i64>,
    pub content_path: Option<String>,
    pub dl_limit: Option<i64>,
    pub dlspeed: Option<i64>,
    pub downloaded: Option<i64>,
    pub downloaded_session: Option<i64>,
    pub eta: Option<i64>,
    pub f_l_piece_prio: Option<bool>,
    pub force_start: Option<bool>,
    pub hash: Option<String>,
    pub last_activity: Option<i64>,
    pub magnet_uri: Option<String>,
    pub max_ratio: Option<f64>,
    pub name: Option<String>,
    pub num_complete: Option<i64>,
    pub num_incomplete: Option<i64>,
    pub num_leechs: Option<i64>,
    pub num_seeds: Option<i64>,
    pub priority: Option<i64>,
    pub progress: Option<f64>,
    pub ratio: Option<f64>,
    pub save_path: Option<String>,
    pub seeding_time: Option<i64>,
    pub seq_dl: Option<bool>,
    pub size: Option<i64>,
    pub state: Option<String>,
    pub super_seeding: Option<bool>,
    pub tags: Option<String>,
    pub time_active: Option<i64>,
    pub total_size: Option<i64>,
    pub tracker: Option<String>,
    pub up_limit: Option<i64>,
    pub uploaded: Option<i64>,
    pub uploaded_session: Option<i64>,
    pub upspeed: Option<i64>,
}

impl Patch for TorrentPatch {
    type Target = Torrent;

    fn from_wire(key: &str, fields: &Map<String, Value>) -> (Self, Vec<FieldIssue>) {
        let mut reader = FieldReader::new(Torrent::COLLECTION, key, fields);
        let patch = Self {
            added_on: reader.read("added_on"),
            amount_left: reader.read("amount_left"),
            auto_tmm: reader.read("auto_tmm"),
            availability: reader.read("availability"),
            category: reader.read("category"),
            completed: reader.read("completed"),
            completion_on: reader.read("completion_on"),
            content_path: reader.read("content_path"),
            dl_limit: reader.read("dl_limit"),
            dlspeed: reader.read("dlspeed"),
            downloaded: reader.read("downloaded"),
            downloaded_session: reader.read("downloaded_session"),
            eta: reader.read("eta"),
            f_l_piece_prio: reader.read("f_l_piece_prio"),
            force_start: reader.read("force_start"),
            hash: reader.read("hash"),
            last_activity: reader.read("last_activity"),
            magnet_uri: reader.read("magnet_uri"),
            max_ratio: reader.read("max_ratio"),
            name: reader.read("name"),
            num_complete: reader.read("num_complete"),
            num_incomplete: reader.read("num_incomplete"),
            num_leechs: reader.read("num_leechs"),
            num_seeds: reader.read("num_seeds"),
            priority: reader.read("priority"),
            progress: reader.read("progress"),
            ratio: reader.read("ratio"),
            save_path: reader.read("save_path"),
            seeding_time: reader.read("seeding_time"),
            seq_dl: reader.read("seq_dl"),
            size: reader.read("size"),
            state: reader.read("state"),
            super_seeding: reader.read("super_seeding"),
            tags: reader.read("tags"),
            time_active: reader.read("time_active"),
            total_size: reader.read("total_size"),
            tracker: reader.read("tracker"),
            up_limit: reader.read("up_limit"),
            uploaded: reader.read("uploaded"),
            uploaded_session: reader.read("uploaded_session"),
            upspeed: reader.read("upspeed"),
        };
        (patch, reader.finish(Torrent::FIELDS))
    }

    fn apply_to(self, target: &mut Torrent) {
        let Self {
            added_on,
            amount_left,
            auto_tmm,
            availability,
            category,
            completed,
            completion_on,
            content_path,
            dl_limit,
            dlspeed,
            downloaded,
            downloaded_session,
            eta,
            f_l_piece_prio,
            force_start,
            hash,
            last_activity,
            magnet_uri,
            max_ratio,
            name,
            num_complete,
            num_incomplete,
            num_leechs,
            num_seeds,
            priority,
            progress,
            ratio,
            save_path,
            seeding_time,
            seq_dl,
            size,
            state,
            super_seeding,
            tags,
            time_active,
            total_size,
            tracker,
            up_limit,
            uploaded,
            uploaded_session,
            upspeed,
        } = self;
        merge(&mut target.added_on, added_on);
        merge(&mut target.amount_left, amount_left);
        merge(&mut target.auto_tmm, auto_tmm);
        merge(&mut target.availability, availability);
        merge(&mut target.category, category);
        merge(&mut target.completed, completed);
        merge(&mut target.completion_on, completion_on);
        merge(&mut target.content_path, content_path);
        merge(&mut target.dl_limit, dl_limit);
        merge(&mut target.dlspeed, dlspeed);
        merge(&mut target.downloaded, downloaded);
        merge(&mut target.downloaded_session, downloaded_session);
        merge(&mut target.eta, eta);
        merge(&mut target.f_l_piece_prio, f_l_piece_prio);
        merge(&mut target.force_start, force_start);
        merge(&mut target.hash, hash);
        merge(&mut target.last_activity, last_activity);
        merge(&mut target.magnet_uri, magnet_uri);
        merge(&mut target.max_ratio, max_ratio);
        merge(&mut target.name, name);
        merge(&mut target.num_complete, num_complete);
        merge(&mut target.num_incomplete, num_incomplete);
        merge(&mut target.num_leechs, num_leechs);
        merge(&mut target.num_seeds, num_seeds);
        merge(&mut target.priority, priority);
        merge(&mut target.progress, progress);
        merge(&mut target.ratio, ratio);
        merge(&mut target.save_path, save_path);
        merge(&mut target.seeding_time, seeding_time);
        merge(&mut target.seq_dl, seq_dl);
        merge(&mut target.size, size);
        merge(&mut target.state, state);
        merge(&mut target.super_seeding, super_seeding);
        merge(&mut target.tags, tags);
        merge(&mut target.time_active, time_active);
        merge(&mut target.total_size, total_size);
        merge(&mut target.tracker, tracker);
        merge(&mut target.up_limit, up_limit);
        merge(&mut target.uploaded, uploaded);
        merge(&mut target.uploaded_session, uploaded_session);
        merge(&mut target.upspeed, upspeed);
    }
}

/// Partial update for a [`Category`].
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub save_path: Option<String>,
}

impl Patch for CategoryPatch {
    type Target = Category;

    fn from_wire(key: &str, fields: &Map<String, Value>) -> (Self, Vec<FieldIssue>) {
        let mut reader = FieldReader::new(Category::COLLECTION, key, fields);
        let patch = Self {
            name: reader.read("name"),
            save_path: reader.read("savePath"),
        };
        (patch, reader.finish(Category::FIELDS))
    }

    fn apply_to(self, target: &mut Category) {
        let Self { name, save_path } = self;
        merge(&mut target.name, name);
        merge(&mut target.save_path, save_path);
    }
}

/// Partial update for the [`ServerState`] sub-record.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct ServerStatePatch {
    pub alltime_dl: Option<i64>,
    pub alltime_ul: Option<i64>,
    pub average_time_queue: Option<i64>,
    pub connection_status: Option<String>,
    pub dht_nodes: Option<i64>,
    pub dl_info_data: Option<i64>,
    pub dl_info_speed: Option<i64>,
    pub dl_rate_limit: Option<i64>,
    pub free_space_on_disk: Option<i64>,
    pub global_ratio: Option<String>,
    pub queued_io_jobs: Option<i64>,
    pub queueing: Option<bool>,
    pub refresh_interval: Option<i64>,
    pub total_buffers_size: Option<i64>,
    pub total_peer_connections: Option<i64>,
    pub total_queued_size: Option<i64>,
    pub total_wasted_session: Option<i64>,
    pub up_info_data: Option<i64>,
    pub up_info_speed: Option<i64>,
    pub up_rate_limit: Option<i64>,
    pub use_alt_speed_limits: Option<bool>,
    pub use_subcategories: Option<bool>,
}

impl Patch for ServerStatePatch {
    type Target = ServerState;

    fn from_wire(key: &str, fields: &Map<String, Value>) -> (Self, Vec<FieldIssue>) {
        let mut reader = FieldReader::new(ServerState::COLLECTION, key, fields);
        let patch = Self {
            alltime_dl: reader.read("alltime_dl"),
            alltime_ul: reader.read("alltime_ul"),
            average_time_queue: reader.read("average_time_queue"),
            connection_status: reader.read("connection_status"),
            dht_nodes: reader.read("dht_nodes"),
            dl_info_data: reader.read("dl_info_data"),
            dl_info_speed: reader.read("dl_info_speed"),
            dl_rate_limit: reader.read("dl_rate_limit"),
            free_space_on_disk: reader.read("free_space_on_disk"),
            global_ratio: reader.read("global_ratio"),
            queued_io_jobs: reader.read("queued_io_jobs"),
            queueing: reader.read("queueing"),
            refresh_interval: reader.read("refresh_interval"),
            total_buffers_size: reader.read("total_buffers_size"),
            total_peer_connections: reader.read("total_peer_connections"),
            total_queued_size: reader.read("total_queued_size"),
            total_wasted_session: reader.read("total_wasted_session"),
            up_info_data: reader.read("up_info_data"),
            up_info_speed: reader.read("up_info_speed"),
            up_rate_limit: reader.read("up_rate_limit"),
            use_alt_speed_limits: reader.read("use_alt_speed_limits"),
            use_subcategories: reader.read("use_subcategories"),
        };
        (patch, reader.finish(ServerState::FIELDS))
    }

    fn apply_to(self, target: &mut ServerState) {
        let Self {
            alltime_dl,
            alltime_ul,
            average_time_queue,
            connection_status,
            dht_nodes,
            dl_info_data,
            dl_info_speed,
            dl_rate_limit,
            free_space_on_disk,
            global_ratio,
            queued_io_jobs,
            queueing,
            refresh_interval,
            total_buffers_size,
            total_peer_connections,
            total_queued_size,
            total_wasted_session,
            up_info_data,
            up_info_speed,
            up_rate_limit,
            use_alt_speed_limits,
            use_subcategories,
        } = self;
        merge(&mut target.alltime_dl, alltime_dl);
        merge(&mut target.alltime_ul, alltime_ul);
        merge(&mut target.average_time_queue, average_time_queue);
        merge(&mut target.connection_status, connection_status);
        merge(&mut target.dht_nodes, dht_nodes);
        merge(&mut target.dl_info_data, dl_info_data);
        merge(&mut target.dl_info_speed, dl_info_speed);
        merge(&mut target.dl_rate_limit, dl_rate_limit);
        merge(&mut target.free_space_on_disk, free_space_on_disk);
        merge(&mut target.global_ratio, global_ratio);
        merge(&mut target.queued_io_jobs, queued_io_jobs);
        merge(&mut target.queueing, queueing);
        merge(&mut target.refresh_interval, refresh_interval);
        merge(&mut target.total_buffers_size, total_buffers_size);
        merge(&mut target.total_peer_connections, total_peer_connections);
        merge(&mut target.total_queued_size, total_queued_size);
        merge(&mut target.total_wasted_session, total_wasted_session);
        merge(&mut target.up_info_data, up_info_data);
        merge(&mut target.up_info_speed, up_info_speed);
        merge(&mut target.up_rate_limit, up_rate_limit);
        merge(&mut target.use_alt_speed_limits, use_alt_speed_limits);
        merge(&mut target.use_subcategories, use_subcategories);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn populated_torrent() -> Torrent {
        Torrent {
            added_on: 1_700_000_000,
            amount_left: 1024,
            auto_tmm: true,
            availability: 1.5,
            category: "linux".into(),
            completed: 4096,
            completion_on: 1_700_000_500,
            content_path: "/data/debian.iso".into(),
            dl_limit: 500_000,
            dlspeed: 123_456,
            downloaded: 4096,
            downloaded_session: 2048,
            eta: 60,
            f_l_piece_prio: true,
            force_start: true,
            hash: "abc".into(),
            last_activity: 1_700_000_600,
            magnet_uri: "magnet:?xt=urn:btih:abc".into(),
            max_ratio: 2.0,
            name: "debian.iso".into(),
            num_complete: 10,
            num_incomplete: 3,
            num_leechs: 2,
            num_seeds: 5,
            priority: 1,
            progress: 0.8,
            ratio: 0.25,
            save_path: "/data".into(),
            seeding_time: 30,
            seq_dl: true,
            size: 5120,
            state: "downloading".into(),
            super_seeding: true,
            tags: "iso,linux".into(),
            time_active: 90,
            total_size: 5120,
            tracker: "udp://tracker.example.org:1337".into(),
            up_limit: 250_000,
            uploaded: 1024,
            uploaded_session: 512,
            upspeed: 4_321,
        }
    }

    fn populated_server_state() -> ServerState {
        ServerState {
            alltime_dl: 1,
            alltime_ul: 2,
            average_time_queue: 3,
            connection_status: "connected".into(),
            dht_nodes: 4,
            dl_info_data: 5,
            dl_info_speed: 6,
            dl_rate_limit: 7,
            free_space_on_disk: 8,
            global_ratio: "1.25".into(),
            queued_io_jobs: 9,
            queueing: true,
            refresh_interval: 1500,
            total_buffers_size: 10,
            total_peer_connections: 11,
            total_queued_size: 12,
            total_wasted_session: 13,
            up_info_data: 14,
            up_info_speed: 15,
            up_rate_limit: 16,
            use_alt_speed_limits: true,
            use_subcategories: true,
        }
    }

    fn as_map<R: serde::Serialize>(record: &R) -> Map<String, Value> {
        match serde_json::to_value(record).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    /// Every serialized field must survive decode + merge onto a default record.
    fn assert_merge_covers_all_fields<P>(populated: P::Target)
    where
        P: Patch,
        P::Target: serde::Serialize,
    {
        let map = as_map(&populated);
        let (patch, issues) = P::from_wire("abc", &map);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");

        let mut merged = P::Target::default();
        patch.apply_to(&mut merged);
        assert_eq!(merged, populated);
    }

    #[test]
    fn torrent_merge_covers_every_field() {
        assert_merge_covers_all_fields::<TorrentPatch>(populated_torrent());
    }

    #[test]
    fn category_merge_covers_every_field() {
        assert_merge_covers_all_fields::<CategoryPatch>(Category {
            name: "linux".into(),
            save_path: "/data/linux".into(),
        });
    }

    #[test]
    fn server_state_merge_covers_every_field() {
        assert_merge_covers_all_fields::<ServerStatePatch>(populated_server_state());
    }

    #[test]
    fn absent_fields_are_left_untouched() {
        let mut torrent = populated_torrent();
        let (patch, issues) = TorrentPatch::from_wire(
            "abc",
            json!({"progress": 0.9, "state": "uploading"})
                .as_object()
                .unwrap(),
        );
        assert!(issues.is_empty());
        patch.apply_to(&mut torrent);

        let expected = Torrent {
            progress: 0.9,
            state: "uploading".into(),
            ..populated_torrent()
        };
        assert_eq!(torrent, expected);
    }

    #[test]
    fn malformed_field_is_skipped_and_rest_merged() {
        let (patch, issues) = TorrentPatch::from_wire(
            "abc",
            json!({"name": "T", "progress": "half", "dlspeed": 10})
                .as_object()
                .unwrap(),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "progress");
        assert_eq!(issues[0].key, "abc");
        assert_eq!(issues[0].collection, "torrents");

        let mut torrent = Torrent {
            progress: 0.3,
            ..Torrent::default()
        };
        patch.apply_to(&mut torrent);
        assert_eq!(torrent.name, "T");
        assert_eq!(torrent.dlspeed, 10);
        assert_eq!(torrent.progress, 0.3);
    }

    #[test]
    fn unknown_and_null_fields_are_ignored() {
        let (patch, issues) = TorrentPatch::from_wire(
            "abc",
            json!({"infohash_v2": "xyz", "name": null, "eta": 8640000})
                .as_object()
                .unwrap(),
        );
        assert!(issues.is_empty());
        assert_eq!(
            patch,
            TorrentPatch {
                eta: Some(8_640_000),
                ..TorrentPatch::default()
            }
        );
    }

    #[test]
    fn float_wire_values_truncate_into_integer_fields() {
        let (patch, issues) = TorrentPatch::from_wire(
            "abc",
            json!({"dlspeed": 1024.9}).as_object().unwrap(),
        );
        assert!(issues.is_empty());
        assert_eq!(patch.dlspeed, Some(1024));
    }

    #[test]
    fn category_uses_camel_case_save_path() {
        let (patch, _) = CategoryPatch::from_wire(
            "linux",
            json!({"name": "linux", "savePath": "/srv"}).as_object().unwrap(),
        );
        assert_eq!(patch.save_path.as_deref(), Some("/srv"));
    }

    fn torrent_strategy() -> impl Strategy<Value = Torrent> {
        let counters = (
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
            any::<i64>(),
        );
        let rates = (
            0.0f64..1e6,
            0.0f64..=1.0,
            0.0f64..1e6,
            -1.0f64..1e6,
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        );
        let texts = (
            "[0-9a-f]{40}",
            ".{0,16}",
            "[a-zA-Z]{0,12}",
            "[a-z,]{0,16}",
            "/[a-z/]{0,20}",
            ".{0,24}",
        );
        (counters, rates, texts).prop_map(
            |(
                (added_on, amount_left, dlspeed, upspeed, size, downloaded, eta, priority),
                (
                    availability,
                    progress,
                    ratio,
                    max_ratio,
                    auto_tmm,
                    force_start,
                    seq_dl,
                    super_seeding,
                ),
                (hash, name, state, tags, save_path, tracker),
            )| Torrent {
                added_on,
                amount_left,
                dlspeed,
                upspeed,
                size,
                downloaded,
                eta,
                priority,
                availability,
                progress,
                ratio,
                max_ratio,
                auto_tmm,
                force_start,
                seq_dl,
                super_seeding,
                hash,
                name,
                state,
                tags,
                save_path,
                tracker,
                ..Torrent::default()
            },
        )
    }

    proptest! {
        #[test]
        fn merge_agrees_with_patch_on_mentioned_fields(
            base in torrent_strategy(),
            progress in proptest::option::of(0.0f64..=1.0),
            name in proptest::option::of("[a-z]{1,12}"),
            dlspeed in proptest::option::of(0i64..10_000_000),
            force_start in proptest::option::of(any::<bool>()),
            state in proptest::option::of("[a-zA-Z]{1,12}"),
            size in proptest::option::of(any::<i64>()),
        ) {
            let patch = TorrentPatch {
                progress,
                name: name.clone(),
                dlspeed,
                force_start,
                state: state.clone(),
                size,
                ..TorrentPatch::default()
            };
            let mut merged = base.clone();
            patch.apply_to(&mut merged);

            prop_assert_eq!(merged.progress, progress.unwrap_or(base.progress));
            prop_assert_eq!(&merged.name, name.as_ref().unwrap_or(&base.name));
            prop_assert_eq!(merged.dlspeed, dlspeed.unwrap_or(base.dlspeed));
            prop_assert_eq!(merged.force_start, force_start.unwrap_or(base.force_start));
            prop_assert_eq!(&merged.state, state.as_ref().unwrap_or(&base.state));
            prop_assert_eq!(merged.size, size.unwrap_or(base.size));

            let untouched = Torrent {
                progress: base.progress,
                name: base.name.clone(),
                dlspeed: base.dlspeed,
                force_start: base.force_start,
                state: base.state.clone(),
                size: base.size,
                ..merged
            };
            prop_assert_eq!(untouched, base);
        }

        #[test]
        fn empty_patch_is_identity(base in torrent_strategy()) {
            let mut merged = base.clone();
            TorrentPatch::default().apply_to(&mut merged);
            prop_assert_eq!(merged, base);
        }
    }
}
