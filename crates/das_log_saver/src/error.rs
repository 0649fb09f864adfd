//! Error types for the log saver.

use das_log_protocol::LogKind;
use thiserror::Error;

/// Result type for saver operations.
pub type SaverResult<T> = Result<T, SaverError>;

/// Result type for persistent store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a [`PersistentStore`](crate::PersistentStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store cannot be reached right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the statement.
    #[error("insert rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Returns true if the same statement may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors that can occur in the saver and its controller.
#[derive(Debug, Error)]
pub enum SaverError {
    /// Spill storage error.
    #[error("storage error: {0}")]
    Storage(#[from] das_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] das_codec::CodecError),

    /// Record decoding error.
    #[error("log error: {0}")]
    Log(#[from] das_log_protocol::LogError),

    /// Persistent store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Dead-letter entry could not be framed.
    #[error("dead-letter entry too large: {size} bytes")]
    EntryTooLarge {
        /// Encoded payload size.
        size: usize,
    },

    /// A batch was handed to the saver of another kind.
    #[error("{found} batch handed to {expected} saver")]
    KindMismatch {
        /// Kind of the saver.
        expected: LogKind,
        /// Kind of the batch.
        found: LogKind,
    },

    /// No saver is registered for the kind.
    #[error("no saver registered for {0}")]
    NotRegistered(LogKind),

    /// The controller has completed shutdown.
    #[error("saver controller is shut down")]
    ShutDown,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
}
