//! Error types for the sync engine.

use qbsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// The response body could not be decoded as a delta.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The poll worker thread could not be spawned.
    #[error("failed to spawn poll worker: {0}")]
    WorkerSpawn(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later cycle may succeed without intervention.
    ///
    /// The engine never retries by itself; callers use this to decide when a
    /// stream of failures should make them give up.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            SyncError::NotConnected => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::ServerError("internal error".into()).is_retryable());
        assert!(!SyncError::AuthenticationFailed("forbidden".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn protocol_error_conversion() {
        let err: SyncError = ProtocolError::invalid_structure("missing rid").into();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(err.to_string().contains("missing rid"));
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to server");

        let err = SyncError::InvalidConfig("jitter_percent must be at most 100".into());
        assert!(err.to_string().contains("100"));
    }
}
