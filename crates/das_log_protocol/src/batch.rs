//! Kind-tagged record batches.

use crate::error::LogResult;
use crate::kind::LogKind;
use crate::record::{LogEvent, LogMode, LogParam, LogRecord, LogStatus, LogValue};
use crate::statement::InsertStatement;
use das_codec::Value;

/// A batch of records of a single kind.
///
/// The batch is the unit that is cached, inserted and spilled as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum LogBatch {
    /// Item readings.
    Value(Vec<LogValue>),
    /// Event messages.
    Event(Vec<LogEvent>),
    /// Parameter changes.
    Param(Vec<LogParam>),
    /// Status transitions.
    Status(Vec<LogStatus>),
    /// Mode changes.
    Mode(Vec<LogMode>),
}

/// Applies the same expression to whichever record vector the batch holds.
macro_rules! each_kind {
    ($batch:expr, $records:ident => $body:expr) => {
        match $batch {
            LogBatch::Value($records) => $body,
            LogBatch::Event($records) => $body,
            LogBatch::Param($records) => $body,
            LogBatch::Status($records) => $body,
            LogBatch::Mode($records) => $body,
        }
    };
}

impl LogBatch {
    /// Creates an empty batch of the given kind.
    pub fn empty(kind: LogKind) -> Self {
        match kind {
            LogKind::Value => LogBatch::Value(Vec::new()),
            LogKind::Event => LogBatch::Event(Vec::new()),
            LogKind::Param => LogBatch::Param(Vec::new()),
            LogKind::Status => LogBatch::Status(Vec::new()),
            LogKind::Mode => LogBatch::Mode(Vec::new()),
        }
    }

    /// Kind of the records.
    pub fn kind(&self) -> LogKind {
        match self {
            LogBatch::Value(_) => LogKind::Value,
            LogBatch::Event(_) => LogKind::Event,
            LogBatch::Param(_) => LogKind::Param,
            LogBatch::Status(_) => LogKind::Status,
            LogBatch::Mode(_) => LogKind::Mode,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        each_kind!(self, records => records.len())
    }

    /// Returns true if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites the tenant of every record.
    pub fn stamp_scheme(&mut self, scheme_id: u32) {
        each_kind!(self, records => {
            for record in records.iter_mut() {
                record.header_mut().scheme_id = scheme_id;
            }
        })
    }

    /// Flattens every record to a wire row.
    pub fn wire_rows(&self) -> Vec<Value> {
        each_kind!(self, records => records.iter().map(|r| Value::Array(r.wire_row())).collect())
    }

    /// Flattens every record to an insert row.
    pub fn insert_rows(&self) -> Vec<Vec<Value>> {
        each_kind!(self, records => records.iter().map(|r| r.insert_row()).collect())
    }

    /// Decodes wire rows of the given kind.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed row; no partial batch is returned.
    pub fn from_wire_rows(kind: LogKind, rows: &[Value]) -> LogResult<Self> {
        match kind {
            LogKind::Value => decode_rows(rows, LogValue::from_wire_row).map(LogBatch::Value),
            LogKind::Event => decode_rows(rows, LogEvent::from_wire_row).map(LogBatch::Event),
            LogKind::Param => decode_rows(rows, LogParam::from_wire_row).map(LogBatch::Param),
            LogKind::Status => decode_rows(rows, LogStatus::from_wire_row).map(LogBatch::Status),
            LogKind::Mode => decode_rows(rows, LogMode::from_wire_row).map(LogBatch::Mode),
        }
    }

    /// Decodes insert rows of the given kind.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed row; no partial batch is returned.
    pub fn from_insert_rows(kind: LogKind, rows: &[Value]) -> LogResult<Self> {
        match kind {
            LogKind::Value => decode_rows(rows, LogValue::from_insert_row).map(LogBatch::Value),
            LogKind::Event => decode_rows(rows, LogEvent::from_insert_row).map(LogBatch::Event),
            LogKind::Param => decode_rows(rows, LogParam::from_insert_row).map(LogBatch::Param),
            LogKind::Status => decode_rows(rows, LogStatus::from_insert_row).map(LogBatch::Status),
            LogKind::Mode => decode_rows(rows, LogMode::from_insert_row).map(LogBatch::Mode),
        }
    }

    /// Builds the bulk insert for this batch.
    pub fn insert_statement(&self) -> InsertStatement {
        InsertStatement::from_rows(self.kind(), self.insert_rows())
    }
}

fn decode_rows<T>(rows: &[Value], decode: impl Fn(&[Value]) -> LogResult<T>) -> LogResult<Vec<T>> {
    rows.iter()
        .map(|row| match row {
            Value::Array(columns) => decode(columns.as_slice()),
            other => Err(das_codec::CodecError::type_mismatch("row", "array", other.type_name()).into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventSeverity, LogHeader};

    fn events() -> LogBatch {
        LogBatch::Event(vec![
            LogEvent::new(LogHeader::new(10), 1, EventSeverity::Info, "start"),
            LogEvent::new(LogHeader::new(20).with_user(4), 2, EventSeverity::Alarm, "stop"),
        ])
    }

    #[test]
    fn stamp_overrides_every_record() {
        let mut batch = events();
        batch.stamp_scheme(9);
        let records = LogEvent::from_batch(batch).unwrap();
        assert!(records.iter().all(|r| r.header.scheme_id == 9));
    }

    #[test]
    fn wire_rows_decode_unstamped() {
        let mut batch = events();
        batch.stamp_scheme(9);
        let rows = batch.wire_rows();

        let decoded = LogBatch::from_wire_rows(LogKind::Event, &rows).unwrap();
        assert_eq!(decoded.len(), 2);
        let records = LogEvent::from_batch(decoded).unwrap();
        assert!(records.iter().all(|r| r.header.scheme_id == 0));
        assert_eq!(records[1].text, "stop");
    }

    #[test]
    fn statement_covers_all_records() {
        let mut batch = events();
        batch.stamp_scheme(7);
        let statement = batch.insert_statement();
        assert_eq!(statement.kind, LogKind::Event);
        assert_eq!(statement.row_count, 2);
        assert_eq!(statement.values.len(), 2 * LogKind::Event.insert_width());
        assert_eq!(statement.values[2], Value::Integer(7));
    }

    #[test]
    fn one_bad_row_fails_the_batch() {
        let mut rows = events().wire_rows();
        rows.push(Value::Integer(1));
        assert!(LogBatch::from_wire_rows(LogKind::Event, &rows).is_err());
    }

    #[test]
    fn empty_batch_per_kind() {
        for kind in LogKind::ALL {
            let batch = LogBatch::empty(kind);
            assert_eq!(batch.kind(), kind);
            assert!(batch.is_empty());
        }
    }
}
