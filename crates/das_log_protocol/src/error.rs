//! Error types for log protocol decoding.

use crate::kind::LogKind;
use das_codec::CodecError;
use thiserror::Error;

/// Result type for log protocol operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while decoding log records and messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogError {
    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Kind code not known to this build.
    #[error("unknown log kind code {0}")]
    UnknownKind(i64),

    /// Command code not known to this build.
    #[error("unknown command code {0}")]
    UnknownCommand(i64),

    /// A row has the wrong number of columns.
    #[error("{kind} row has {found} columns, expected {expected}")]
    RowLength {
        /// Kind being decoded.
        kind: LogKind,
        /// Expected column count.
        expected: usize,
        /// Actual column count.
        found: usize,
    },

    /// A field holds a value it cannot hold.
    #[error("{kind} field `{field}`: {reason}")]
    InvalidField {
        /// Kind being decoded.
        kind: LogKind,
        /// Field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// A message for one kind was routed to another.
    #[error("expected {expected} batch, got {found}")]
    KindMismatch {
        /// Kind the receiver handles.
        expected: LogKind,
        /// Kind found in the message.
        found: LogKind,
    },
}

impl LogError {
    /// Creates an invalid field error.
    pub fn invalid_field(kind: LogKind, field: &'static str, reason: impl Into<String>) -> Self {
        LogError::InvalidField {
            kind,
            field,
            reason: reason.into(),
        }
    }
}
