//! In-memory spill backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory spill backend.
///
/// Clones share the same buffer, so a test can hand one clone to a
/// dead-letter file and keep another to inspect what was spilled.
///
/// # Example
///
/// ```rust
/// use das_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// let mut writer = backend.clone();
/// writer.append(b"spilled").unwrap();
/// assert_eq!(backend.data(), b"spilled");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    refuse_writes: Arc<AtomicBool>,
    tear_next: Arc<Mutex<Option<usize>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            ..Self::default()
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Makes every subsequent `append` and `replace` fail.
    pub fn set_refuse_writes(&self, refuse: bool) {
        self.refuse_writes.store(refuse, Ordering::SeqCst);
    }

    /// Makes the next `append` write only its first `bytes` bytes and then
    /// fail, as a full disk would.
    pub fn tear_next_append(&self, bytes: usize) {
        *self.tear_next.lock() = Some(bytes);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.refuse_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRefused("in-memory backend is read-only".into()));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        if let Some(bytes) = self.tear_next.lock().take() {
            data.extend_from_slice(&new_data[..bytes.min(new_data.len())]);
            return Err(StorageError::WriteRefused(format!("append torn after {bytes} bytes")));
        }
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn replace(&mut self, new_data: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        *self.data.write() = new_data.to_vec();
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current_size = data.len() as u64;
        if new_size > current_size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to size {new_size} which is greater than current size {current_size}"),
            )));
        }

        data.truncate(new_size as usize);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn clones_share_content() {
        let backend = InMemoryBackend::with_data(b"abc".to_vec());
        let mut other = backend.clone();
        other.replace(b"xyz").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"xyz");
    }

    #[test]
    fn torn_append_leaves_a_prefix_until_truncated() {
        let mut backend = InMemoryBackend::with_data(b"ok".to_vec());
        backend.tear_next_append(3);

        assert!(backend.append(b"partial").is_err());
        assert_eq!(backend.data(), b"okpar");
        backend.truncate(2).unwrap();
        assert_eq!(backend.data(), b"ok");

        // only one append is torn
        backend.append(b"!").unwrap();
        assert_eq!(backend.data(), b"ok!");
    }

    #[test]
    fn refused_writes_leave_content_untouched() {
        let mut backend = InMemoryBackend::with_data(b"keep".to_vec());
        backend.set_refuse_writes(true);

        assert!(matches!(
            backend.append(b"more"),
            Err(StorageError::WriteRefused(_))
        ));
        assert!(backend.replace(b"").is_err());
        assert_eq!(backend.data(), b"keep");

        backend.set_refuse_writes(false);
        backend.append(b"!").unwrap();
        assert_eq!(backend.data(), b"keep!");
    }
}
