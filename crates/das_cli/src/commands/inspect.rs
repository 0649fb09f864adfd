//! Inspect command implementation.

use super::{dead_letter_path, describe_end, existing_kinds, quarantine_path, scan_file, CliError};
use das_log_protocol::LogKind;
use serde::Serialize;
use std::path::Path;

/// Directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Directory path.
    pub path: String,
    /// One entry per dead-letter file found.
    pub files: Vec<FileStats>,
    /// Entries across all files.
    pub total_entries: usize,
    /// Rows across all files.
    pub total_rows: usize,
}

/// Statistics for one kind's dead-letter file.
#[derive(Debug, Serialize)]
pub struct FileStats {
    /// Kind name.
    pub kind: LogKind,
    /// File name.
    pub file: String,
    /// File size in bytes.
    pub size: usize,
    /// Valid entries.
    pub entries: usize,
    /// Rows in valid entries.
    pub rows: usize,
    /// How decoding ended.
    pub end: String,
    /// Undecodable bytes between valid entries.
    pub damaged_bytes: usize,
    /// Bytes already moved to the quarantine file.
    pub quarantined_bytes: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for every dead-letter file in `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let kinds = existing_kinds(path);
    if kinds.is_empty() {
        return Err(CliError::NoFiles(path.to_path_buf()).into());
    }

    let mut files = Vec::new();
    for kind in kinds {
        let file = dead_letter_path(path, kind);
        let scan = scan_file(&file)?;
        let quarantined_bytes = std::fs::metadata(quarantine_path(path, kind))
            .map(|m| m.len())
            .unwrap_or(0);
        files.push(FileStats {
            kind,
            file: kind.dead_letter_file_name(),
            size: scan.total_bytes,
            entries: scan.entries.len(),
            rows: scan.row_count(),
            end: describe_end(&scan.end),
            damaged_bytes: scan.damaged_bytes(),
            quarantined_bytes,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        total_entries: files.iter().map(|f| f.entries).sum(),
        total_rows: files.iter().map(|f| f.rows).sum(),
        files,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("DAS Dead-Letter Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    for file in &result.files {
        println!("[{}] {}", file.kind, file.file);
        println!("  Size:        {} bytes", file.size);
        println!("  Entries:     {}", file.entries);
        println!("  Rows:        {}", file.rows);
        println!("  End:         {}", file.end);
        if file.damaged_bytes > 0 {
            println!("  Damaged:     {} bytes", file.damaged_bytes);
        }
        if file.quarantined_bytes > 0 {
            println!("  Quarantined: {} bytes", file.quarantined_bytes);
        }
    }
    println!();
    println!(
        "Total: {} entries, {} rows",
        result.total_entries, result.total_rows
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{append_batch, rows};
    use das_log_protocol::{LogHeader, LogMode, LogParam};

    #[test]
    fn counts_entries_and_rows_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        append_batch(
            dir.path(),
            &rows(vec![
                LogMode::new(LogHeader::new(1).with_scheme(2), 1, 1),
                LogMode::new(LogHeader::new(2).with_scheme(2), 1, 2),
            ]),
        );
        append_batch(dir.path(), &rows(vec![LogMode::new(LogHeader::new(3).with_scheme(5), 1, 3)]));
        append_batch(
            dir.path(),
            &rows(vec![LogParam::new(LogHeader::new(4).with_scheme(2), 1, 1, "on")]),
        );

        let result = inspect(dir.path()).unwrap();
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.total_entries, 3);
        assert_eq!(result.total_rows, 4);

        let mode = result.files.iter().find(|f| f.kind == LogKind::Mode).unwrap();
        assert_eq!((mode.entries, mode.rows), (2, 3));
        assert_eq!(mode.end, "clean");
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no dead-letter files"));
    }
}
