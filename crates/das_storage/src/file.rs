//! File-based spill backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file-based spill backend.
///
/// The data file is accompanied by a `<name>.lock` file holding an
/// exclusive advisory lock for the lifetime of the backend, so two server
/// processes never spill into the same file. The lock lives on a separate
/// file because [`StorageBackend::replace`] swaps the data file's inode.
///
/// # Durability
///
/// - `append` writes through to the OS; `sync` calls `File::sync_all()`
/// - `replace` writes a temp file, syncs it, renames it over the data file
///   and syncs the parent directory
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    _lock_file: Option<File>,
}

impl FileBackend {
    /// Opens or creates a backend at the given path, creating parent
    /// directories if needed, and takes the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the lock,
    /// or an I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = sidecar(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let file = Self::open_data(path)?;
        debug!(path = %path.display(), "opened spill file");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            _lock_file: Some(lock_file),
        })
    }

    /// Opens an existing file for inspection without taking the lock.
    ///
    /// Writes through a read-only backend fail with an I/O error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            _lock_file: None,
        })
    }

    /// Returns the path to the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_data(path: &Path) -> StorageResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?)
    }
}

fn sidecar(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

impl StorageBackend for FileBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.lock();
        let offset = file.metadata()?.len();
        if !data.is_empty() {
            file.write_all(data)?;
            file.flush()?;
        }
        Ok(offset)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let tmp_path = sidecar(&self.path, "tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }

        *self.file.lock() = Self::open_data(&self.path)?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.lock();
        let size = file.metadata()?.len();
        if new_size > size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to size {new_size} which is greater than current size {size}"),
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fail_log_1.dat");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spill.dat");

        let mut backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn replace_keeps_only_new_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spill.dat");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"consumed|remaining").unwrap();
        backend.replace(b"remaining").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"remaining");

        // appends after a replace go to the new file
        backend.append(b"|next").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"remaining|next");
        assert!(!sidecar(&path, "tmp").exists());
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spill.dat");

        let _first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(StorageError::Locked { .. })));

        // inspection does not need the lock
        let reader = FileBackend::open_read_only(&path).unwrap();
        assert_eq!(reader.size().unwrap(), 0);
    }

    #[test]
    fn content_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("spill.dat");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"persistent");
    }

    #[test]
    fn truncate_drops_the_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spill.dat");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"kept|torn").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"kept");

        // appends continue at the new end
        assert_eq!(backend.append(b"|next").unwrap(), 4);
        assert_eq!(backend.read_all().unwrap(), b"kept|next");
        assert!(backend.truncate(100).is_err());
    }

    #[test]
    fn read_only_refuses_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spill.dat");
        std::fs::write(&path, b"abc").unwrap();

        let mut reader = FileBackend::open_read_only(&path).unwrap();
        assert!(reader.append(b"x").is_err());
        assert_eq!(reader.read_all().unwrap(), b"abc");
    }
}
