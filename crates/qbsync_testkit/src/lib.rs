//! # qbsync Testkit
//!
//! Test utilities for qbsync.
//!
//! This crate provides:
//! - JSON payload fixtures shaped like maindata responses
//! - A simulated Web API server that serves real deltas
//! - Property-based test generators using proptest
//! - Concurrent reader stress utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qbsync_testkit::prelude::*;
//!
//! let server = SimulatedServer::new();
//! server.upsert_torrent("abc", torrent_json("T", 0.5));
//! let delta = server.fetch_delta(0)?;
//! assert!(delta.full_update);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod server;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::server::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use server::*;
pub use stress::*;
