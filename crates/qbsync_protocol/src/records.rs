//! Typed entity records.
//!
//! Field names follow the maindata wire names so a serialized record is
//! shaped like the payload it was merged from.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A typed record that patches are merged into.
pub trait Record: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Wire name of the collection holding this record.
    const COLLECTION: &'static str;

    /// Wire names of every field, in declaration order.
    const FIELDS: &'static [&'static str];
}

/// A record stored in a keyed collection.
///
/// The identifying field always equals the map key the record lives under.
pub trait Keyed: Record {
    /// Returns the identifying field.
    fn key(&self) -> &str;

    /// Overwrites the identifying field with the map key.
    fn assign_key(&mut self, key: &str);
}

/// A torrent, keyed by info-hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    /// Time the torrent was added (Unix seconds).
    pub added_on: i64,
    /// Bytes left to download.
    pub amount_left: i64,
    /// Whether automatic torrent management is enabled.
    pub auto_tmm: bool,
    /// Distributed copies available in the swarm.
    pub availability: f64,
    /// Category name, empty when uncategorized.
    pub category: String,
    /// Bytes completed.
    pub completed: i64,
    /// Time the torrent completed (Unix seconds).
    pub completion_on: i64,
    /// Absolute path of the torrent content.
    pub content_path: String,
    /// Download limit in bytes/s (`-1` or `0` when unlimited).
    pub dl_limit: i64,
    /// Download speed in bytes/s.
    pub dlspeed: i64,
    /// Bytes downloaded.
    pub downloaded: i64,
    /// Bytes downloaded this session.
    pub downloaded_session: i64,
    /// Estimated seconds to completion.
    pub eta: i64,
    /// First/last piece priority.
    pub f_l_piece_prio: bool,
    /// Force-start flag.
    pub force_start: bool,
    /// Info-hash.
    pub hash: String,
    /// Last activity time (Unix seconds).
    pub last_activity: i64,
    /// Magnet URI.
    pub magnet_uri: String,
    /// Maximum share ratio.
    pub max_ratio: f64,
    /// Display name.
    pub name: String,
    /// Seeds in the swarm.
    pub num_complete: i64,
    /// Leechers in the swarm.
    pub num_incomplete: i64,
    /// Connected leechers.
    pub num_leechs: i64,
    /// Connected seeds.
    pub num_seeds: i64,
    /// Queue position.
    pub priority: i64,
    /// Progress in `[0, 1]`.
    pub progress: f64,
    /// Share ratio.
    pub ratio: f64,
    /// Save path.
    pub save_path: String,
    /// Seconds spent seeding.
    pub seeding_time: i64,
    /// Sequential download flag.
    pub seq_dl: bool,
    /// Selected size in bytes.
    pub size: i64,
    /// State name (`downloading`, `stalledUP`, ...).
    pub state: String,
    /// Super-seeding flag.
    pub super_seeding: bool,
    /// Comma-separated tag names.
    pub tags: String,
    /// Seconds active.
    pub time_active: i64,
    /// Total size in bytes.
    pub total_size: i64,
    /// Current tracker URL.
    pub tracker: String,
    /// Upload limit in bytes/s.
    pub up_limit: i64,
    /// Bytes uploaded.
    pub uploaded: i64,
    /// Bytes uploaded this session.
    pub uploaded_session: i64,
    /// Upload speed in bytes/s.
    pub upspeed: i64,
}

impl Record for Torrent {
    const COLLECTION: &'static str = "torrents";
    const FIELDS: &'static [&'static str] = &[
        "added_on",
        "amount_left",
        "auto_tmm",
        "availability",
        "category",
        "completed",
        "completion_on",
        "content_path",
        "dl_limit",
        "dlspeed",
        "downloaded",
        "downloaded_session",
        "eta",
        "f_l_piece_prio",
        "force_start",
        "hash",
        "last_activity",
        "magnet_uri",
        "max_ratio",
        "name",
        "num_complete",
        "num_incomplete",
        "num_leechs",
        "num_seeds",
        "priority",
        "progress",
        "ratio",
        "save_path",
        "seeding_time",
        "seq_dl",
        "size",
        "state",
        "super_seeding",
        "tags",
        "time_active",
        "total_size",
        "tracker",
        "up_limit",
        "uploaded",
        "uploaded_session",
        "upspeed",
    ];
}

impl Keyed for Torrent {
    fn key(&self) -> &str {
        &self.hash
    }

    fn assign_key(&mut self, key: &str) {
        if self.hash != key {
            self.hash = key.to_string();
        }
    }
}

impl Torrent {
    /// Returns the tag names carried in the comma-separated `tags` field.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// A category, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Category name.
    pub name: String,
    /// Default save path for torrents in this category.
    #[serde(rename = "savePath")]
    pub save_path: String,
}

impl Record for Category {
    const COLLECTION: &'static str = "categories";
    const FIELDS: &'static [&'static str] = &["name", "savePath"];
}

impl Keyed for Category {
    fn key(&self) -> &str {
        &self.name
    }

    fn assign_key(&mut self, key: &str) {
        if self.name != key {
            self.name = key.to_string();
        }
    }
}

/// Global transfer and connection state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    /// All-time bytes downloaded.
    pub alltime_dl: i64,
    /// All-time bytes uploaded.
    pub alltime_ul: i64,
    /// Average time in queue (ms).
    pub average_time_queue: i64,
    /// `connected`, `firewalled` or `disconnected`.
    pub connection_status: String,
    /// DHT nodes connected.
    pub dht_nodes: i64,
    /// Bytes downloaded this session.
    pub dl_info_data: i64,
    /// Global download speed in bytes/s.
    pub dl_info_speed: i64,
    /// Global download limit in bytes/s.
    pub dl_rate_limit: i64,
    /// Free space on the default save path.
    pub free_space_on_disk: i64,
    /// Global share ratio, formatted by the server.
    pub global_ratio: String,
    /// Queued disk I/O jobs.
    pub queued_io_jobs: i64,
    /// Whether torrent queueing is enabled.
    pub queueing: bool,
    /// Suggested UI refresh interval (ms).
    pub refresh_interval: i64,
    /// Total buffer size in bytes.
    pub total_buffers_size: i64,
    /// Total peer connections.
    pub total_peer_connections: i64,
    /// Total queued bytes.
    pub total_queued_size: i64,
    /// Bytes wasted this session.
    pub total_wasted_session: i64,
    /// Bytes uploaded this session.
    pub up_info_data: i64,
    /// Global upload speed in bytes/s.
    pub up_info_speed: i64,
    /// Global upload limit in bytes/s.
    pub up_rate_limit: i64,
    /// Whether alternative speed limits are active.
    pub use_alt_speed_limits: bool,
    /// Whether subcategories are enabled.
    pub use_subcategories: bool,
}

impl Record for ServerState {
    const COLLECTION: &'static str = "server_state";
    const FIELDS: &'static [&'static str] = &[
        "alltime_dl",
        "alltime_ul",
        "average_time_queue",
        "connection_status",
        "dht_nodes",
        "dl_info_data",
        "dl_info_speed",
        "dl_rate_limit",
        "free_space_on_disk",
        "global_ratio",
        "queued_io_jobs",
        "queueing",
        "refresh_interval",
        "total_buffers_size",
        "total_peer_connections",
        "total_queued_size",
        "total_wasted_session",
        "up_info_data",
        "up_info_speed",
        "up_rate_limit",
        "use_alt_speed_limits",
        "use_subcategories",
    ];
}
