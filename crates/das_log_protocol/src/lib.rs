//! # DAS Log Protocol
//!
//! Log record types and sync messages for DAS.
//!
//! This crate provides:
//! - [`LogKind`] and the per-kind table layouts
//! - The five record types ([`LogValue`], [`LogEvent`], [`LogParam`],
//!   [`LogStatus`], [`LogMode`]) behind the [`LogRecord`] trait
//! - [`LogBatch`], the kind-tagged unit of caching and spilling
//! - Protocol messages ([`LogDataRequest`], [`LogDataAnswer`], [`LogPack`])
//! - [`InsertStatement`] for bulk inserts
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Example
//!
//! ```
//! use das_codec::Encode;
//! use das_log_protocol::{LogBatch, LogHeader, LogMode, LogPack};
//!
//! let pack = LogPack::new(LogBatch::Mode(vec![LogMode::new(LogHeader::new(1_000), 3, 1)]));
//! let bytes = pack.encode().unwrap();
//!
//! let mut received = LogPack::decode_checked(&bytes).unwrap();
//! received.batch.stamp_scheme(12);
//! assert_eq!(received.batch.insert_statement().row_count, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod kind;
mod messages;
mod record;
mod statement;

pub use batch::LogBatch;
pub use error::{LogError, LogResult};
pub use kind::LogKind;
pub use messages::{Command, LogAck, LogDataAnswer, LogDataRequest, LogMessage, LogPack};
pub use record::{
    EventSeverity, LogEvent, LogHeader, LogMode, LogParam, LogRecord, LogStatus, LogValue,
};
pub use statement::InsertStatement;
