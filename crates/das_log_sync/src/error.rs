//! Error types for log synchronization.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing logs with a peer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Not connected.
    #[error("not connected to peer")]
    NotConnected,

    /// The payload did not decode as the expected message.
    #[error("bad payload: {0}")]
    BadPayload(#[from] das_log_protocol::LogError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] das_codec::CodecError),

    /// Persistent store error.
    #[error("store error: {0}")]
    Store(#[from] das_log_saver::StoreError),

    /// The store thread is no longer accepting jobs.
    #[error("store thread stopped")]
    StoreThreadStopped,

    /// The store thread could not be spawned.
    #[error("failed to spawn store thread: {0}")]
    Spawn(#[source] std::io::Error),
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

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            SyncError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_log_protocol::LogError;
    use das_log_saver::StoreError;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("handshake refused").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(SyncError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!SyncError::from(StoreError::Rejected("bad".into())).is_retryable());
        assert!(!SyncError::from(LogError::UnknownKind(9)).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to peer");
        let err = SyncError::from(LogError::UnknownKind(9));
        assert!(err.to_string().contains("9"));
    }
}
