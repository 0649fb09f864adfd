//! # DAS Testkit
//!
//! Test utilities for DAS log sync.
//!
//! This crate provides:
//! - A controllable [`FlakyStore`] and controller/connection fixtures
//! - Property-based generators for records and batches using proptest
//! - A [`MockAgent`] that answers gap-fill requests from a backlog
//!
//! ## Usage
//!
//! ```rust
//! use das_log_protocol::{LogBatch, LogHeader, LogKind, LogMode};
//! use das_log_sync::SyncConfig;
//! use das_testkit::prelude::*;
//!
//! let fixture = TestController::new();
//! let conn = fixture.connect(4, SyncConfig::new().with_kinds([LogKind::Mode]));
//! let agent = MockAgent::new();
//! agent.push_history(LogBatch::Mode(vec![LogMode::new(LogHeader::new(1), 1, 2)]));
//!
//! conn.check();
//! agent.serve(&conn.connection, &conn).unwrap();
//! assert_eq!(fixture.store.tenant_row_count(LogKind::Mode, 4), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
