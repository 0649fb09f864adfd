//! # DAS Storage
//!
//! Byte-level spill storage for DAS dead-letter files.
//!
//! Backends are **opaque byte stores**: they append, read back and
//! atomically replace their whole content. The dead-letter format (entry
//! envelope, checksums, CBOR payloads) lives in `das_log_saver`; nothing
//! here interprets the bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests, with write-failure injection
//! - [`FileBackend`] - Persistent file guarded by an exclusive lock file
//!
//! ## Example
//!
//! ```rust
//! use das_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"entry-1").unwrap();
//! backend.append(b"entry-2").unwrap();
//! backend.replace(b"entry-2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"entry-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
