//! Storage backend trait definition.

use crate::error::StorageResult;

/// A spill storage backend.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_all` returns every byte appended since the last `replace`
/// - `replace` is all-or-nothing: a crash leaves either the old or the
///   new content, never a mix
/// - Backends must be `Send + Sync` for use behind a shared lock
pub trait StorageBackend: Send + Sync {
    /// Reads the whole content.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Atomically replaces the whole content with `data`.
    ///
    /// Used after a replay to keep only the entries that were not consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the new content cannot be written. The old
    /// content is left untouched in that case.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the content to `new_size` bytes.
    ///
    /// Used to roll back an append that failed partway.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is past the end or the content cannot
    /// be shortened.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;
}
