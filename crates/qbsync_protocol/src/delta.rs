//! The maindata delta payload.

use crate::coerce::FromWire;
use crate::error::{FieldIssue, ProtocolError, ProtocolResult};
use crate::patch::{CategoryPatch, Patch, ServerStatePatch, TorrentPatch};
use crate::records::{Category, Record, ServerState, Torrent};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// One response from the sync endpoint.
///
/// Every collection is optional on the wire; an absent collection decodes to
/// an empty map or list. On a full update the collections describe the whole
/// state, otherwise only what changed since the requested `rid`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    /// Response identifier assigned by the server.
    pub rid: u64,
    /// Whether this payload replaces the whole state.
    pub full_update: bool,
    /// Torrent patches by info-hash.
    pub torrents: BTreeMap<String, TorrentPatch>,
    /// Info-hashes of removed torrents.
    pub torrents_removed: Vec<String>,
    /// Category patches by name.
    pub categories: BTreeMap<String, CategoryPatch>,
    /// Names of removed categories.
    pub categories_removed: Vec<String>,
    /// Added tag names.
    pub tags: Vec<String>,
    /// Removed tag names.
    pub tags_removed: Vec<String>,
    /// Tracker URL to the full list of torrent hashes using it.
    pub trackers: BTreeMap<String, Vec<String>>,
    /// Removed tracker URLs.
    pub trackers_removed: Vec<String>,
    /// Global state patch.
    pub server_state: Option<ServerStatePatch>,
    /// Fields that were present but rejected during decoding.
    pub ignored: Vec<FieldIssue>,
}

impl Delta {
    /// Creates an empty full-update delta.
    pub fn full(rid: u64) -> Self {
        Self {
            rid,
            full_update: true,
            ..Self::default()
        }
    }

    /// Creates an empty incremental delta.
    pub fn incremental(rid: u64) -> Self {
        Self {
            rid,
            ..Self::default()
        }
    }

    /// Adds a torrent patch.
    pub fn with_torrent(mut self, hash: impl Into<String>, patch: TorrentPatch) -> Self {
        self.torrents.insert(hash.into(), patch);
        self
    }

    /// Adds a category patch.
    pub fn with_category(mut self, name: impl Into<String>, patch: CategoryPatch) -> Self {
        self.categories.insert(name.into(), patch);
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the hash list of a tracker.
    pub fn with_tracker(mut self, url: impl Into<String>, hashes: Vec<String>) -> Self {
        self.trackers.insert(url.into(), hashes);
        self
    }

    /// Sets the server state patch.
    pub fn with_server_state(mut self, patch: ServerStatePatch) -> Self {
        self.server_state = Some(patch);
        self
    }

    /// Marks a torrent as removed.
    pub fn removing_torrent(mut self, hash: impl Into<String>) -> Self {
        self.torrents_removed.push(hash.into());
        self
    }

    /// Marks a category as removed.
    pub fn removing_category(mut self, name: impl Into<String>) -> Self {
        self.categories_removed.push(name.into());
        self
    }

    /// Marks a tag as removed.
    pub fn removing_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags_removed.push(tag.into());
        self
    }

    /// Marks a tracker as removed.
    pub fn removing_tracker(mut self, url: impl Into<String>) -> Self {
        self.trackers_removed.push(url.into());
        self
    }

    /// Returns true if the delta carries no changes besides its `rid`.
    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
            && self.torrents_removed.is_empty()
            && self.categories.is_empty()
            && self.categories_removed.is_empty()
            && self.tags.is_empty()
            && self.tags_removed.is_empty()
            && self.trackers.is_empty()
            && self.trackers_removed.is_empty()
            && self.server_state.is_none()
    }

    /// Decodes a delta from a JSON response body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }

    /// Decodes a delta from a parsed JSON value.
    ///
    /// Only a missing or unusable `rid`, an unusable `full_update`, or a body
    /// that is not an object, fail the whole payload. Everything below that level degrades to ignored
    /// fields.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_structure("expected object"))?;

        let rid = root
            .get("rid")
            .ok_or_else(|| ProtocolError::invalid_structure("missing rid"))
            .and_then(|v| {
                u64::from_wire(v)
                    .map_err(|e| ProtocolError::invalid_structure(format!("invalid rid: {e}")))
            })?;

        // An unusable flag fails the payload instead of degrading to a merge.
        let full_update = match root.get("full_update").filter(|v| !v.is_null()) {
            None => false,
            Some(v) => bool::from_wire(v).map_err(|e| {
                ProtocolError::invalid_structure(format!("invalid full_update: {e}"))
            })?,
        };

        let mut decoder = Decoder {
            root,
            ignored: Vec::new(),
        };

        let torrents = decoder.patches::<TorrentPatch>(Torrent::COLLECTION);
        let torrents_removed = decoder.names("torrents_removed");
        let categories = decoder.patches::<CategoryPatch>(Category::COLLECTION);
        let categories_removed = decoder.names("categories_removed");
        let tags = decoder.names("tags");
        let tags_removed = decoder.names("tags_removed");
        let trackers = decoder.trackers();
        let trackers_removed = decoder.names("trackers_removed");
        let server_state = decoder.server_state();

        Ok(Self {
            rid,
            full_update,
            torrents,
            torrents_removed,
            categories,
            categories_removed,
            tags,
            tags_removed,
            trackers,
            trackers_removed,
            server_state,
            ignored: decoder.ignored,
        })
    }
}

struct Decoder<'a> {
    root: &'a Map<String, Value>,
    ignored: Vec<FieldIssue>,
}

impl<'a> Decoder<'a> {
    fn reject(&mut self, collection: &'static str, key: &str, field: &str, reason: String) {
        warn!(collection, key, field, reason = %reason, "ignoring malformed field");
        self.ignored.push(FieldIssue {
            collection,
            key: key.to_string(),
            field: field.to_string(),
            reason,
        });
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.root.get(field).filter(|v| !v.is_null())
    }

    fn object(&mut self, field: &'static str) -> Option<&'a Map<String, Value>> {
        match self.present(field)? {
            Value::Object(map) => Some(map),
            _ => {
                self.reject("maindata", "", field, "expected object".into());
                None
            }
        }
    }

    fn patches<P: Patch>(&mut self, collection: &'static str) -> BTreeMap<String, P> {
        let mut out = BTreeMap::new();
        let Some(entries) = self.object(collection) else {
            return out;
        };
        for (key, value) in entries {
            match value {
                Value::Object(fields) => {
                    let (patch, issues) = P::from_wire(key, fields);
                    self.ignored.extend(issues);
                    out.insert(key.clone(), patch);
                }
                _ => self.reject(collection, key, "", "expected object".into()),
            }
        }
        out
    }

    /// Reads a list of names, skipping non-string entries.
    fn names(&mut self, field: &'static str) -> Vec<String> {
        let Some(value) = self.present(field) else {
            return Vec::new();
        };
        let Value::Array(items) = value else {
            self.reject("maindata", "", field, "expected array".into());
            return Vec::new();
        };
        let mut names = Vec::with_capacity(items.len());
        for item in items {
            match String::from_wire(item) {
                Ok(name) => names.push(name),
                Err(e) => self.reject("maindata", "", field, e.to_string()),
            }
        }
        names
    }

    fn trackers(&mut self) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        let Some(entries) = self.object("trackers") else {
            return out;
        };
        for (url, value) in entries {
            match Vec::<String>::from_wire(value) {
                Ok(hashes) => {
                    out.insert(url.clone(), hashes);
                }
                Err(e) => self.reject("trackers", url, "", e.to_string()),
            }
        }
        out
    }

    fn server_state(&mut self) -> Option<ServerStatePatch> {
        let fields = self.object(ServerState::COLLECTION)?;
        let (patch, issues) = ServerStatePatch::from_wire("", fields);
        self.ignored.extend(issues);
        Some(patch)
    }
}
