//! # qbsync Protocol
//!
//! Wire model for the qBittorrent `sync/maindata` endpoint.
//!
//! This crate provides:
//! - Typed entity records (`Torrent`, `Category`, `ServerState`)
//! - Optional-field patch records and their merge rules
//! - The `Delta` payload with deletion lists
//! - Field-tolerant JSON decoding and the numeric coercion rule
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod coerce;
mod delta;
mod error;
mod patch;
mod records;

pub use coerce::{CoerceError, FromWire};
pub use delta::Delta;
pub use error::{FieldIssue, ProtocolError, ProtocolResult};
pub use patch::{CategoryPatch, Patch, ServerStatePatch, TorrentPatch};
pub use records::{Category, Keyed, Record, ServerState, Torrent};
