//! Verify command implementation.

use super::{dead_letter_path, describe_end, existing_kinds, scan_file, CliError};
use das_log_protocol::{LogBatch, LogKind};
use das_log_saver::dead_letter::ScanEnd;
use std::path::Path;

/// Verification result for one file.
#[derive(Debug)]
pub struct VerifyResult {
    /// Kind of the file.
    pub kind: LogKind,
    /// Entries with a valid envelope and checksum.
    pub valid_entries: usize,
    /// Entries whose rows do not decode as the file's kind.
    pub invalid_entries: usize,
    /// How decoding ended.
    pub end: ScanEnd,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, kind: Option<LogKind>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying dead-letter files in {:?}", path);
    println!();

    let results = verify(path, kind)?;
    for result in &results {
        print_result(result);
    }

    let problems: usize = results.iter().map(|r| r.errors.len()).sum();
    println!();
    if problems == 0 {
        println!("✓ Dead-letter verification passed");
        Ok(())
    } else {
        println!("✗ Dead-letter verification failed");
        Err(CliError::VerificationFailed(problems).into())
    }
}

/// Verifies one kind's file, or every file present.
pub fn verify(
    path: &Path,
    kind: Option<LogKind>,
) -> Result<Vec<VerifyResult>, Box<dyn std::error::Error>> {
    let kinds = match kind {
        Some(kind) => {
            let file = dead_letter_path(path, kind);
            if !file.exists() {
                return Err(CliError::MissingFile { kind, path: file }.into());
            }
            vec![kind]
        }
        None => existing_kinds(path),
    };
    if kinds.is_empty() {
        return Err(CliError::NoFiles(path.to_path_buf()).into());
    }

    kinds
        .into_iter()
        .map(|kind| verify_file(path, kind))
        .collect()
}

fn verify_file(path: &Path, kind: LogKind) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let scan = scan_file(&dead_letter_path(path, kind))?;
    let mut result = VerifyResult {
        kind,
        valid_entries: scan.entries.len(),
        invalid_entries: 0,
        end: scan.end.clone(),
        errors: Vec::new(),
    };

    for entry in &scan.entries {
        if let Err(e) = LogBatch::from_insert_rows(kind, &entry.rows) {
            result.invalid_entries += 1;
            result.errors.push(format!("entry at {}: {}", entry.offset, e));
        }
    }
    for region in &scan.damaged {
        result.errors.push(format!(
            "damaged region at {} ({} bytes): {}",
            region.offset, region.size, region.reason
        ));
    }
    // A truncated tail is what a crash mid-append leaves; replay drops it.
    if let ScanEnd::Corrupt { .. } = scan.end {
        result.errors.push(describe_end(&scan.end));
    }

    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  {} ({}):", result.kind.dead_letter_file_name(), result.kind);
    println!("    Valid entries:   {}", result.valid_entries);
    println!("    Invalid entries: {}", result.invalid_entries);
    println!("    End:             {}", describe_end(&result.end));

    if result.is_ok() {
        println!("    Status: OK");
    } else {
        println!("    Status: FAILED");
        for error in &result.errors {
            println!("      - {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{append_batch, append_bytes, rows};
    use das_log_protocol::{LogHeader, LogStatus};

    fn status_batch() -> LogBatch {
        rows(vec![LogStatus::raised(LogHeader::new(7).with_scheme(1), 2, 3, vec!["a".into()])])
    }

    #[test]
    fn clean_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        append_batch(dir.path(), &status_batch());

        let results = verify(dir.path(), None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(results[0].valid_entries, 1);
    }

    #[test]
    fn truncated_tail_is_not_a_problem() {
        let dir = tempfile::tempdir().unwrap();
        let batch = status_batch();
        append_batch(dir.path(), &batch);
        append_bytes(dir.path(), &batch, b"DAS");

        let results = verify(dir.path(), Some(LogKind::Status)).unwrap();
        assert!(matches!(results[0].end, ScanEnd::Truncated { .. }));
        assert!(results[0].is_ok());
    }

    #[test]
    fn corrupt_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let batch = status_batch();
        append_batch(dir.path(), &batch);
        append_bytes(dir.path(), &batch, b"JUNKJUNKJUNKJUNK");

        let results = verify(dir.path(), None).unwrap();
        assert!(matches!(results[0].end, ScanEnd::Corrupt { .. }));
        assert_eq!(results[0].errors.len(), 1);
    }

    #[test]
    fn damaged_region_between_entries_fails() {
        let dir = tempfile::tempdir().unwrap();
        let batch = status_batch();
        append_batch(dir.path(), &batch);
        append_bytes(dir.path(), &batch, b"JUNK");
        append_batch(dir.path(), &batch);

        let results = verify(dir.path(), None).unwrap();
        assert_eq!(results[0].valid_entries, 2);
        assert_eq!(results[0].end, ScanEnd::Clean);
        assert_eq!(results[0].errors.len(), 1);
        assert!(results[0].errors[0].starts_with("damaged region"));
    }

    #[test]
    fn missing_kind_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        append_batch(dir.path(), &status_batch());
        let err = verify(dir.path(), Some(LogKind::Value)).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
