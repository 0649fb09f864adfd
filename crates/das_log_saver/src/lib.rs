//! # DAS Log Saver
//!
//! Durable write-back cache for device logs.
//!
//! Real-time log batches are cached per kind and per tenant, flushed to the
//! [`PersistentStore`] by background workers, and spilled to per-kind
//! dead-letter files whenever the store fails. Those files are replayed the
//! next time a [`SaverController`] starts.
//!
//! ## Components
//!
//! - [`Saver`]: one kind's tenant-partitioned cache
//! - [`SaverController`]: all savers plus the worker pool
//! - [`DeadLetterFile`]: checksummed append-only spill file
//! - [`MemoryStore`]: in-memory [`PersistentStore`] for tests
//!
//! ## Example
//!
//! ```rust
//! use das_log_protocol::{LogHeader, LogKind, LogMode};
//! use das_log_saver::{MemoryStore, SaverConfig, SaverController};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = Arc::new(MemoryStore::new());
//! let controller = SaverController::new(SaverConfig::new(dir.path()), store.clone()).unwrap();
//!
//! assert!(controller.add(7, vec![LogMode::new(LogHeader::new(1_000), 2, 1)]));
//! controller.shutdown();
//! assert_eq!(store.row_count(LogKind::Mode), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod controller;
pub mod dead_letter;
mod error;
mod saver;
mod stats;
mod store;

pub use config::SaverConfig;
pub use controller::SaverController;
pub use dead_letter::{DeadLetterFile, ReplayReport, ReplayStep};
pub use error::{SaverError, SaverResult, StoreError, StoreResult};
pub use saver::{FlushReport, Saver, SaverBase};
pub use stats::{SaverStats, SaverStatsSnapshot};
pub use store::{MemoryStore, PersistentStore};
