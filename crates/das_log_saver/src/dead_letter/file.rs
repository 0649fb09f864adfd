//! Per-kind dead-letter file.

use super::envelope::{encode_entry, scan_entries, ScanEnd, ScanResult};
use crate::error::SaverResult;
use das_codec::Value;
use das_log_protocol::LogKind;
use das_storage::{FileBackend, StorageBackend};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// What a replay callback decided about one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStep {
    /// The rows were committed; drop the entry.
    Consumed,
    /// The store is still failing; keep this entry and everything after it.
    Retry,
    /// The rows can never be inserted; move the entry to quarantine.
    Reject,
}

/// Outcome of [`DeadLetterFile::replay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    /// Entries committed and dropped from the file.
    pub entries_replayed: usize,
    /// Rows in those entries.
    pub rows_replayed: usize,
    /// Entries still in the file.
    pub entries_remaining: usize,
    /// Bytes moved to quarantine (rejected or undecodable).
    pub bytes_quarantined: usize,
    /// Bytes of an incomplete trailing entry that were discarded.
    pub bytes_truncated: usize,
}

/// Where undecodable bytes go.
enum Quarantine {
    /// `fail_log_<code>.dat.corrupt` next to the data file.
    File(PathBuf),
    /// Any backend, for tests.
    Backend(Box<dyn StorageBackend>),
}

/// Append-only spill file for one log kind.
///
/// Each entry holds one batch of insert rows. Entries are appended by
/// saver flushes when the persistent store fails and consumed once at
/// startup by [`replay`](Self::replay), which rewrites the file to keep
/// only the entries that were not committed.
pub struct DeadLetterFile {
    kind: LogKind,
    path: Option<PathBuf>,
    backend: Mutex<Box<dyn StorageBackend>>,
    quarantine: Mutex<Quarantine>,
}

impl std::fmt::Debug for DeadLetterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterFile")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DeadLetterFile {
    /// Opens (creating if needed) the dead-letter file for `kind` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is locked by
    /// another process.
    pub fn open(dir: &Path, kind: LogKind) -> SaverResult<Self> {
        let path = dir.join(kind.dead_letter_file_name());
        let backend = FileBackend::open(&path)?;
        let mut quarantine_name = path.as_os_str().to_os_string();
        quarantine_name.push(".corrupt");
        Ok(Self {
            kind,
            path: Some(path),
            backend: Mutex::new(Box::new(backend)),
            quarantine: Mutex::new(Quarantine::File(PathBuf::from(quarantine_name))),
        })
    }

    /// Wraps arbitrary backends for the file and its quarantine.
    pub fn with_backends(
        kind: LogKind,
        backend: Box<dyn StorageBackend>,
        quarantine: Box<dyn StorageBackend>,
    ) -> Self {
        Self {
            kind,
            path: None,
            backend: Mutex::new(backend),
            quarantine: Mutex::new(Quarantine::Backend(quarantine)),
        }
    }

    /// Kind this file holds.
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Path of the data file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one batch of insert rows and syncs it.
    ///
    /// A failed write is rolled back to the previous size so a partial
    /// entry never sits in front of later ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub fn append(&self, rows: &[Vec<Value>]) -> SaverResult<()> {
        let entry = encode_entry(rows)?;
        let mut backend = self.backend.lock();
        let size = backend.size()?;
        let written = match backend.append(&entry) {
            Ok(_) => backend.sync(),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(rollback) = backend.truncate(size) {
                error!(kind = %self.kind, size, error = %rollback, "dead-letter rollback failed");
            }
            return Err(e.into());
        }
        debug!(kind = %self.kind, rows = rows.len(), bytes = entry.len(), "spilled batch");
        Ok(())
    }

    /// Decodes the current content without changing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn scan(&self) -> SaverResult<ScanResult> {
        Ok(scan_entries(&self.backend.lock().read_all()?))
    }

    /// Number of valid entries currently in the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn pending_entries(&self) -> SaverResult<usize> {
        Ok(self.scan()?.entries.len())
    }

    /// Feeds every entry, oldest first, to `insert`, then rewrites the file
    /// with what was not consumed.
    ///
    /// The first [`ReplayStep::Retry`] stops the replay so entry order is
    /// kept. Rejected entries, damaged regions and any undecodable remainder
    /// are appended to the quarantine before the file is rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or rewritten. The file is
    /// left untouched in that case.
    pub fn replay(&self, mut insert: impl FnMut(&[Value]) -> ReplayStep) -> SaverResult<ReplayReport> {
        let mut backend = self.backend.lock();
        let data = backend.read_all()?;
        if data.is_empty() {
            return Ok(ReplayReport::default());
        }
        let scan = scan_entries(&data);

        let mut report = ReplayReport::default();
        let mut quarantined: Vec<u8> = Vec::new();
        let mut keep_from = scan.entries.len();

        for region in &scan.damaged {
            warn!(kind = %self.kind, offset = region.offset, bytes = region.size, reason = %region.reason, "damaged dead-letter region moved to quarantine");
            quarantined.extend_from_slice(&data[region.offset..region.offset + region.size]);
        }

        for (index, entry) in scan.entries.iter().enumerate() {
            match insert(&entry.rows) {
                ReplayStep::Consumed => {
                    report.entries_replayed += 1;
                    report.rows_replayed += entry.rows.len();
                }
                ReplayStep::Reject => {
                    warn!(kind = %self.kind, offset = entry.offset, "rejected dead-letter entry moved to quarantine");
                    quarantined.extend_from_slice(&data[entry.offset..entry.offset + entry.size]);
                }
                ReplayStep::Retry => {
                    keep_from = index;
                    report.entries_remaining = scan.entries.len() - index;
                    break;
                }
            }
        }

        match &scan.end {
            ScanEnd::Clean => {}
            ScanEnd::Truncated { offset } => {
                report.bytes_truncated = data.len() - offset;
                warn!(kind = %self.kind, bytes = report.bytes_truncated, "discarding incomplete dead-letter entry");
            }
            ScanEnd::Corrupt { offset, reason } => {
                error!(kind = %self.kind, offset, %reason, "dead-letter file corrupt, moving remainder to quarantine");
                quarantined.extend_from_slice(&data[*offset..]);
            }
        }

        if !quarantined.is_empty() {
            self.quarantine_bytes(&quarantined)?;
            report.bytes_quarantined = quarantined.len();
        }

        let kept: Vec<u8> = scan.entries[keep_from..]
            .iter()
            .flat_map(|entry| &data[entry.offset..entry.offset + entry.size])
            .copied()
            .collect();
        backend.replace(&kept)?;
        Ok(report)
    }

    fn quarantine_bytes(&self, bytes: &[u8]) -> SaverResult<()> {
        let mut quarantine = self.quarantine.lock();
        match &mut *quarantine {
            Quarantine::File(path) => {
                let mut backend = FileBackend::open(path)?;
                backend.append(bytes)?;
                backend.sync()?;
            }
            Quarantine::Backend(backend) => {
                backend.append(bytes)?;
                backend.sync()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_storage::InMemoryBackend;
    use tempfile::tempdir;

    fn row(i: i64) -> Vec<Value> {
        vec![Value::Integer(i), Value::Integer(0), Value::Integer(7), Value::Integer(1), Value::Integer(i)]
    }

    fn memory_file() -> (DeadLetterFile, InMemoryBackend, InMemoryBackend) {
        let main = InMemoryBackend::new();
        let quarantine = InMemoryBackend::new();
        let file = DeadLetterFile::with_backends(
            LogKind::Mode,
            Box::new(main.clone()),
            Box::new(quarantine.clone()),
        );
        (file, main, quarantine)
    }

    #[test]
    fn consumed_entries_are_dropped() {
        let (file, main, _) = memory_file();
        file.append(&[row(1), row(2)]).unwrap();
        file.append(&[row(3)]).unwrap();
        assert_eq!(file.pending_entries().unwrap(), 2);

        let report = file.replay(|_| ReplayStep::Consumed).unwrap();
        assert_eq!(report.entries_replayed, 2);
        assert_eq!(report.rows_replayed, 3);
        assert!(main.data().is_empty());
    }

    #[test]
    fn retry_keeps_the_rest_in_order() {
        let (file, _, _) = memory_file();
        for i in 0..3 {
            file.append(&[row(i)]).unwrap();
        }

        let mut seen = 0;
        let report = file
            .replay(|_| {
                seen += 1;
                if seen == 2 {
                    ReplayStep::Retry
                } else {
                    ReplayStep::Consumed
                }
            })
            .unwrap();
        assert_eq!(report.entries_replayed, 1);
        assert_eq!(report.entries_remaining, 2);

        let scan = file.scan().unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.entries[0].rows[0], Value::Array(row(1)));
    }

    #[test]
    fn corrupt_remainder_goes_to_quarantine() {
        let (file, main, quarantine) = memory_file();
        file.append(&[row(1)]).unwrap();
        let mut raw = main.clone();
        raw.append(b"\x00garbage").unwrap();

        let report = file.replay(|_| ReplayStep::Retry).unwrap();
        assert_eq!(report.entries_remaining, 1);
        assert_eq!(report.bytes_quarantined, 8);
        assert_eq!(quarantine.data(), b"\x00garbage");
        assert_eq!(file.scan().unwrap().end, ScanEnd::Clean);
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let (file, main, _) = memory_file();
        file.append(&[row(1)]).unwrap();
        let before = main.data();

        main.tear_next_append(6);
        assert!(file.append(&[row(2)]).is_err());
        assert_eq!(main.data(), before);

        file.append(&[row(3)]).unwrap();
        let report = file.replay(|_| ReplayStep::Consumed).unwrap();
        assert_eq!(report.entries_replayed, 2);
        assert_eq!(report.bytes_truncated, 0);
    }

    #[test]
    fn spills_after_a_torn_entry_are_replayed() {
        let (file, main, quarantine) = memory_file();
        let mut raw = main.clone();
        // Header of an entry claiming a large payload, cut off after it.
        let mut torn = b"DASF".to_vec();
        torn.extend_from_slice(&1u16.to_le_bytes());
        torn.extend_from_slice(&100_000u32.to_le_bytes());
        raw.append(&torn).unwrap();
        file.append(&[row(1)]).unwrap();
        file.append(&[row(2), row(3)]).unwrap();

        let report = file.replay(|_| ReplayStep::Consumed).unwrap();
        assert_eq!(report.entries_replayed, 2);
        assert_eq!(report.rows_replayed, 3);
        assert_eq!(report.bytes_truncated, 0);
        assert_eq!(report.bytes_quarantined, torn.len());
        assert_eq!(quarantine.data(), torn);
        assert!(main.data().is_empty());
    }

    #[test]
    fn retry_after_a_damaged_region_keeps_only_entries() {
        let (file, main, _) = memory_file();
        file.append(&[row(1)]).unwrap();
        let mut raw = main.clone();
        raw.append(b"DASF\x01").unwrap();
        file.append(&[row(2)]).unwrap();

        let report = file.replay(|_| ReplayStep::Retry).unwrap();
        assert_eq!(report.entries_remaining, 2);

        let scan = file.scan().unwrap();
        assert!(scan.damaged.is_empty());
        assert_eq!(scan.end, ScanEnd::Clean);
        assert_eq!(scan.row_count(), 2);
    }

    #[test]
    fn rejected_entry_is_quarantined() {
        let (file, _, quarantine) = memory_file();
        file.append(&[row(1)]).unwrap();
        file.append(&[row(2)]).unwrap();

        let mut first = true;
        let report = file
            .replay(|_| {
                if std::mem::take(&mut first) {
                    ReplayStep::Reject
                } else {
                    ReplayStep::Consumed
                }
            })
            .unwrap();
        assert_eq!(report.entries_replayed, 1);
        assert!(report.bytes_quarantined > 0);
        assert_eq!(scan_entries(&quarantine.data()).entries.len(), 1);
        assert_eq!(file.pending_entries().unwrap(), 0);
    }

    #[test]
    fn rewrite_failure_leaves_file_untouched() {
        let (file, main, _) = memory_file();
        file.append(&[row(1)]).unwrap();
        let before = main.data();

        main.set_refuse_writes(true);
        assert!(file.replay(|_| ReplayStep::Consumed).is_err());
        assert_eq!(main.data(), before);
    }

    #[test]
    fn file_backed_quarantine_sits_next_to_data() {
        let dir = tempdir().unwrap();
        let file = DeadLetterFile::open(dir.path(), LogKind::Status).unwrap();
        assert_eq!(file.path().unwrap(), dir.path().join("fail_log_4.dat"));
        file.append(&[row(1)]).unwrap();

        let path = dir.path().join("fail_log_4.dat");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"XXXX-corrupt");
        // the data file is replaced wholesale, so write through a second handle
        std::fs::write(&path, &bytes).unwrap();

        let report = file.replay(|_| ReplayStep::Consumed).unwrap();
        assert_eq!(report.entries_replayed, 1);
        let corrupt = std::fs::read(dir.path().join("fail_log_4.dat.corrupt")).unwrap();
        assert_eq!(corrupt, b"XXXX-corrupt");
        assert!(std::fs::read(&path).unwrap().is_empty());
    }
}
