//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use das_log_protocol::LogKind;
use das_log_saver::dead_letter::{scan_entries, ScanEnd, ScanResult};
use das_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors reported by the commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Directory holds no dead-letter file.
    #[error("no dead-letter files found in {0}")]
    NoFiles(PathBuf),

    /// A kind's file does not exist.
    #[error("{kind} dead-letter file not found: {path}")]
    MissingFile {
        /// Requested kind.
        kind: LogKind,
        /// Expected path.
        path: PathBuf,
    },

    /// Verification found problems.
    #[error("verification failed: {0} problem(s)")]
    VerificationFailed(usize),
}

/// Parses a kind given by name or numeric code.
pub fn parse_kind(s: &str) -> Result<LogKind, String> {
    if let Some(kind) = LogKind::from_name(&s.to_ascii_lowercase()) {
        return Ok(kind);
    }
    s.parse::<i64>()
        .ok()
        .and_then(|code| LogKind::from_code(code).ok())
        .ok_or_else(|| format!("unknown log kind `{s}`"))
}

/// Path of `kind`'s dead-letter file in `dir`.
pub fn dead_letter_path(dir: &Path, kind: LogKind) -> PathBuf {
    dir.join(kind.dead_letter_file_name())
}

/// Path of the quarantine file next to `kind`'s dead-letter file.
pub fn quarantine_path(dir: &Path, kind: LogKind) -> PathBuf {
    dir.join(format!("{}.corrupt", kind.dead_letter_file_name()))
}

/// Kinds whose dead-letter file exists in `dir`.
pub fn existing_kinds(dir: &Path) -> Vec<LogKind> {
    LogKind::ALL
        .into_iter()
        .filter(|kind| dead_letter_path(dir, *kind).exists())
        .collect()
}

/// Reads and scans a dead-letter file without taking its lock.
pub fn scan_file(path: &Path) -> Result<ScanResult, Box<dyn std::error::Error>> {
    let backend = FileBackend::open_read_only(path)?;
    let data = backend.read_all()?;
    debug!(path = %path.display(), bytes = data.len(), "scanning dead-letter file");
    Ok(scan_entries(&data))
}

/// Short description of how a scan ended.
pub fn describe_end(end: &ScanEnd) -> String {
    match end {
        ScanEnd::Clean => "clean".to_string(),
        ScanEnd::Truncated { offset } => format!("truncated at {offset}"),
        ScanEnd::Corrupt { offset, reason } => format!("corrupt at {offset}: {reason}"),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_by_name_or_code() {
        assert_eq!(parse_kind("status"), Ok(LogKind::Status));
        assert_eq!(parse_kind("EVENT"), Ok(LogKind::Event));
        assert_eq!(parse_kind("5"), Ok(LogKind::Mode));
        assert!(parse_kind("9").is_err());
        assert!(parse_kind("alarm").is_err());
    }

    #[test]
    fn existing_kinds_lists_present_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dead_letter_path(dir.path(), LogKind::Param), b"").unwrap();
        assert_eq!(existing_kinds(dir.path()), vec![LogKind::Param]);
        assert_eq!(
            quarantine_path(dir.path(), LogKind::Param).file_name().unwrap(),
            "fail_log_3.dat.corrupt"
        );
    }
}
