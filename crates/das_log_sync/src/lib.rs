//! # DAS Log Sync
//!
//! Per-connection log synchronization between the server and a DAS agent.
//!
//! Each connection gets a [`Synchronizer`] holding one [`SyncItem`] per log
//! kind. Two paths feed the server:
//!
//! - **Gap-fill**: [`Synchronizer::check`] requests history, answers are
//!   bulk-inserted on the [`StoreThread`] and acknowledged only once stored.
//!   An answer that reports more backlog chains the next request.
//! - **Real-time**: pushed packs are handed to the
//!   [`SaverController`](das_log_saver::SaverController), acknowledged,
//!   applied to the [`StructureState`] and delivered to observers.
//!
//! ## Example
//!
//! ```rust
//! use das_codec::Encode;
//! use das_log_protocol::{LogBatch, LogHeader, LogKind, LogMode, LogPack};
//! use das_log_saver::{MemoryStore, SaverConfig, SaverController};
//! use das_log_sync::{MockConnection, SyncConfig, Synchronizer};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = Arc::new(MemoryStore::new());
//! let controller = SaverController::new(SaverConfig::new(dir.path()), store.clone()).unwrap();
//! let connection = Arc::new(MockConnection::new(7));
//! let sync = Synchronizer::new(SyncConfig::default(), connection.clone(), controller, store).unwrap();
//!
//! let pack = LogPack::new(LogBatch::Mode(vec![LogMode::new(LogHeader::new(1_000), 2, 1)]));
//! assert!(sync.process_pack(LogKind::Mode, &pack.encode().unwrap(), 1).unwrap());
//! assert_eq!(sync.structure().mode(2), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod item;
mod observer;
mod stats;
mod store_thread;
mod structure;
mod synchronizer;

pub use config::SyncConfig;
pub use connection::{LogConnection, MockConnection};
pub use error::{SyncError, SyncResult};
pub use item::SyncItem;
pub use observer::{LogNotification, LogObserver, ObserverId, ObserverRegistry};
pub use stats::{SyncStats, SyncStatsSnapshot};
pub use store_thread::StoreThread;
pub use structure::{ItemValue, StructureState};
pub use synchronizer::Synchronizer;
