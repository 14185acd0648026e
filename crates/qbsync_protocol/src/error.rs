//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that reject a whole payload.
///
/// Problems confined to a single field never produce one of these; they are
/// reported as [`FieldIssue`]s instead.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The body is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The body is JSON but not shaped like a maindata payload.
    #[error("invalid payload structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl ProtocolError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

/// A field that was present on the wire but could not be used.
///
/// The owning record is still merged; only this field is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Collection the record belongs to (e.g. `torrents`).
    pub collection: &'static str,
    /// Map key of the record, empty for scalar sub-records.
    pub key: String,
    /// Wire name of the offending field.
    pub field: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}.{}: {}", self.collection, self.field, self.reason)
        } else {
            write!(
                f,
                "{}[{}].{}: {}",
                self.collection, self.key, self.field, self.reason
            )
        }
    }
}
