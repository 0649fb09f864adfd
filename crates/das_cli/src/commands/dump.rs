//! Dump command implementation.

use super::{dead_letter_path, describe_end, scan_file, CliError};
use das_codec::Value;
use das_log_protocol::{LogBatch, LogKind};
use serde::Serialize;
use serde_json::Map;
use std::path::Path;

/// One dead-letter entry for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Byte offset in the file.
    pub offset: usize,
    /// Encoded size in bytes.
    pub size: usize,
    /// Rows as field-name maps.
    pub records: Vec<Map<String, serde_json::Value>>,
    /// Why the rows do not decode as the file's kind, if they don't.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<String>,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    kind: LogKind,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (entries, end) = read_entries(path, kind, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(kind, &entries, &end);
        }
    }

    Ok(())
}

/// Reads up to `limit` entries of `kind`'s file, with how the scan ended.
pub fn read_entries(
    path: &Path,
    kind: LogKind,
    limit: Option<usize>,
) -> Result<(Vec<EntryInfo>, String), Box<dyn std::error::Error>> {
    let file = dead_letter_path(path, kind);
    if !file.exists() {
        return Err(CliError::MissingFile { kind, path: file }.into());
    }

    let scan = scan_file(&file)?;
    let fields = kind.insert_fields();
    let entries = scan
        .entries
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|entry| EntryInfo {
            offset: entry.offset,
            size: entry.size,
            records: entry
                .rows
                .iter()
                .map(|row| record_map(&fields, row))
                .collect(),
            invalid: LogBatch::from_insert_rows(kind, &entry.rows)
                .err()
                .map(|e| e.to_string()),
        })
        .collect();

    Ok((entries, describe_end(&scan.end)))
}

fn record_map(fields: &[&str], row: &Value) -> Map<String, serde_json::Value> {
    let columns = row.as_array().unwrap_or(&[]);
    let mut map = Map::new();
    for (index, column) in columns.iter().enumerate() {
        let name = fields
            .get(index)
            .map_or_else(|| format!("column_{index}"), |f| f.to_string());
        map.insert(name, to_json(column));
    }
    map
}

/// Converts a codec value to JSON. Bytes become lowercase hex.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Bytes(bytes) => serde_json::Value::String(hex_encode(bytes)),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(pairs) => {
            let mut map = Map::new();
            for (key, value) in pairs {
                let key = match key {
                    Value::Text(s) => s.clone(),
                    other => to_json(other).to_string(),
                };
                map.insert(key, to_json(value));
            }
            serde_json::Value::Object(map)
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn print_text_output(kind: LogKind, entries: &[EntryInfo], end: &str) {
    println!("{} ({} entries shown, file {})", kind.dead_letter_file_name(), entries.len(), end);
    println!("{:-<60}", "");

    for entry in entries {
        println!("@{:>8}  {} bytes  {} rows", entry.offset, entry.size, entry.records.len());
        if let Some(reason) = &entry.invalid {
            println!("  ! {}", reason);
        }
        for record in &entry.records {
            let line: Vec<String> = record.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!("  {}", line.join(" "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{append_batch, append_bytes, rows};
    use das_log_protocol::{EventSeverity, LogEvent, LogHeader};
    use das_log_saver::dead_letter::encode_entry;

    #[test]
    fn records_are_keyed_by_insert_field() {
        let dir = tempfile::tempdir().unwrap();
        let batch = rows(vec![LogEvent::new(
            LogHeader::new(1_500).with_user(3).with_scheme(9),
            42,
            EventSeverity::Critical,
            "boiler pressure",
        )]);
        append_batch(dir.path(), &batch);

        let (entries, end) = read_entries(dir.path(), LogKind::Event, None).unwrap();
        assert_eq!(end, "clean");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].invalid.is_none());

        let record = &entries[0].records[0];
        assert_eq!(record["timestamp_msecs"], serde_json::json!(1_500));
        assert_eq!(record["scheme_id"], serde_json::json!(9));
        assert_eq!(record["text"], serde_json::json!("boiler pressure"));
    }

    #[test]
    fn undecodable_rows_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let batch = LogBatch::empty(LogKind::Mode);
        let bytes = encode_entry(&[vec![Value::from(1), Value::from("short")]]).unwrap();
        append_bytes(dir.path(), &batch, &bytes);

        let (entries, _) = read_entries(dir.path(), LogKind::Mode, Some(10)).unwrap();
        assert!(entries[0].invalid.is_some());
        assert_eq!(entries[0].records[0]["timestamp_msecs"], serde_json::json!(1));
    }

    #[test]
    fn limit_caps_entries() {
        let dir = tempfile::tempdir().unwrap();
        for ts in 0..4 {
            append_batch(
                dir.path(),
                &rows(vec![LogEvent::new(LogHeader::new(ts), 1, EventSeverity::Info, "x")]),
            );
        }
        let (entries, _) = read_entries(dir.path(), LogKind::Event, Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].offset > entries[0].offset);
    }

    #[test]
    fn values_convert_to_json() {
        assert_eq!(to_json(&Value::Bytes(vec![0xde, 0xad])), serde_json::json!("dead"));
        assert_eq!(to_json(&Value::Float(f64::NAN)), serde_json::Value::Null);
        assert_eq!(
            to_json(&Value::map([("a", Value::from(1))])),
            serde_json::json!({"a": 1})
        );
    }
}
