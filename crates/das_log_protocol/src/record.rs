//! Typed log records.
//!
//! A record flattens into a row of [`Value`]s in two shapes:
//! - the **wire row**: `timestamp_msecs, user_id, <payload>`. Agents never
//!   send a tenant id; the server stamps it from the connection.
//! - the **insert row**: `timestamp_msecs, user_id, scheme_id, <payload>`,
//!   matching [`LogKind::insert_fields`]. Dead-letter files store these.

use crate::batch::LogBatch;
use crate::error::{LogError, LogResult};
use crate::kind::LogKind;
use das_codec::Value;
use std::fmt;

/// Columns shared by every record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogHeader {
    /// Store-assigned id, 0 until the record is persisted.
    pub id: i64,
    /// Producer-side event time in milliseconds since the Unix epoch.
    pub timestamp_msecs: i64,
    /// Attributed user, 0 for the system.
    pub user_id: u32,
    /// Tenant the record belongs to.
    pub scheme_id: u32,
}

impl LogHeader {
    /// Creates a header for a system-attributed record.
    pub fn new(timestamp_msecs: i64) -> Self {
        Self {
            timestamp_msecs,
            ..Self::default()
        }
    }

    /// Sets the attributed user.
    pub fn with_user(mut self, user_id: u32) -> Self {
        self.user_id = user_id;
        self
    }

    /// Sets the tenant.
    pub fn with_scheme(mut self, scheme_id: u32) -> Self {
        self.scheme_id = scheme_id;
        self
    }
}

/// A record of one log kind.
///
/// Implemented by the five concrete record types. The associated
/// [`KIND`](LogRecord::KIND) is what routes a record to its saver, table
/// and dead-letter file.
pub trait LogRecord: Clone + fmt::Debug + Send + Sync + 'static {
    /// Kind of this record type.
    const KIND: LogKind;

    /// Shared columns.
    fn header(&self) -> &LogHeader;

    /// Mutable shared columns.
    fn header_mut(&mut self) -> &mut LogHeader;

    /// Kind-specific columns, in [`LogKind::payload_fields`] order.
    fn payload_values(&self) -> Vec<Value>;

    /// Rebuilds a record from its header and kind-specific columns.
    ///
    /// # Errors
    ///
    /// Returns an error if a column has the wrong type or range.
    fn from_payload(header: LogHeader, payload: &[Value]) -> LogResult<Self>;

    /// Wraps typed records into the kind-tagged batch.
    fn into_batch(records: Vec<Self>) -> LogBatch;

    /// Unwraps a batch of this kind, handing back batches of other kinds.
    ///
    /// # Errors
    ///
    /// Returns the batch unchanged if it holds a different kind.
    fn from_batch(batch: LogBatch) -> Result<Vec<Self>, LogBatch>;

    /// Flattens to a wire row.
    fn wire_row(&self) -> Vec<Value> {
        let header = self.header();
        let mut row = vec![
            Value::Integer(header.timestamp_msecs),
            Value::from(header.user_id),
        ];
        row.extend(self.payload_values());
        row
    }

    /// Flattens to an insert row.
    fn insert_row(&self) -> Vec<Value> {
        let header = self.header();
        let mut row = vec![
            Value::Integer(header.timestamp_msecs),
            Value::from(header.user_id),
            Value::from(header.scheme_id),
        ];
        row.extend(self.payload_values());
        row
    }

    /// Decodes a wire row. The tenant is left at 0 for the caller to stamp.
    ///
    /// # Errors
    ///
    /// Returns an error on a wrong column count or column type.
    fn from_wire_row(row: &[Value]) -> LogResult<Self> {
        check_width(Self::KIND, Self::KIND.wire_width(), row)?;
        let header = LogHeader {
            id: 0,
            timestamp_msecs: read_i64(Self::KIND, "timestamp_msecs", &row[0])?,
            user_id: read_u32(Self::KIND, "user_id", &row[1])?,
            scheme_id: 0,
        };
        Self::from_payload(header, &row[2..])
    }

    /// Decodes an insert row.
    ///
    /// # Errors
    ///
    /// Returns an error on a wrong column count or column type.
    fn from_insert_row(row: &[Value]) -> LogResult<Self> {
        check_width(Self::KIND, Self::KIND.insert_width(), row)?;
        let header = LogHeader {
            id: 0,
            timestamp_msecs: read_i64(Self::KIND, "timestamp_msecs", &row[0])?,
            user_id: read_u32(Self::KIND, "user_id", &row[1])?,
            scheme_id: read_u32(Self::KIND, "scheme_id", &row[2])?,
        };
        Self::from_payload(header, &row[3..])
    }
}

fn check_width(kind: LogKind, expected: usize, row: &[Value]) -> LogResult<()> {
    if row.len() != expected {
        return Err(LogError::RowLength {
            kind,
            expected,
            found: row.len(),
        });
    }
    Ok(())
}

fn read_i64(kind: LogKind, field: &'static str, value: &Value) -> LogResult<i64> {
    value
        .as_integer()
        .ok_or_else(|| LogError::invalid_field(kind, field, format!("expected integer, found {}", value.type_name())))
}

fn read_u32(kind: LogKind, field: &'static str, value: &Value) -> LogResult<u32> {
    let n = read_i64(kind, field, value)?;
    u32::try_from(n).map_err(|_| LogError::invalid_field(kind, field, format!("{n} out of range")))
}

fn read_text(kind: LogKind, field: &'static str, value: &Value) -> LogResult<String> {
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| LogError::invalid_field(kind, field, format!("expected text, found {}", value.type_name())))
}

fn read_text_array(kind: LogKind, field: &'static str, value: &Value) -> LogResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| LogError::invalid_field(kind, field, format!("expected array, found {}", value.type_name())))?;
    items.iter().map(|item| read_text(kind, field, item)).collect()
}

fn read_bool(kind: LogKind, field: &'static str, value: &Value) -> LogResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Integer(0) => Ok(false),
        Value::Integer(1) => Ok(true),
        other => Err(LogError::invalid_field(
            kind,
            field,
            format!("expected bool, found {}", other.type_name()),
        )),
    }
}

fn read_scalar(kind: LogKind, field: &'static str, value: &Value) -> LogResult<Value> {
    match value {
        Value::Array(_) | Value::Map(_) => Err(LogError::invalid_field(
            kind,
            field,
            format!("expected scalar, found {}", value.type_name()),
        )),
        scalar => Ok(scalar.clone()),
    }
}

/// A device item reading.
#[derive(Debug, Clone, PartialEq)]
pub struct LogValue {
    /// Shared columns.
    pub header: LogHeader,
    /// Device item the reading belongs to.
    pub item_id: u32,
    /// Display value after scaling.
    pub value: Value,
    /// Raw value as read from the device.
    pub raw_value: Value,
}

impl LogValue {
    /// Creates a reading.
    pub fn new(header: LogHeader, item_id: u32, value: impl Into<Value>, raw_value: impl Into<Value>) -> Self {
        Self {
            header,
            item_id,
            value: value.into(),
            raw_value: raw_value.into(),
        }
    }
}

impl LogRecord for LogValue {
    const KIND: LogKind = LogKind::Value;

    fn header(&self) -> &LogHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LogHeader {
        &mut self.header
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.item_id),
            self.value.clone(),
            self.raw_value.clone(),
        ]
    }

    fn from_payload(header: LogHeader, payload: &[Value]) -> LogResult<Self> {
        Ok(Self {
            header,
            item_id: read_u32(Self::KIND, "item_id", &payload[0])?,
            value: read_scalar(Self::KIND, "value", &payload[1])?,
            raw_value: read_scalar(Self::KIND, "raw_value", &payload[2])?,
        })
    }

    fn into_batch(records: Vec<Self>) -> LogBatch {
        LogBatch::Value(records)
    }

    fn from_batch(batch: LogBatch) -> Result<Vec<Self>, LogBatch> {
        match batch {
            LogBatch::Value(records) => Ok(records),
            other => Err(other),
        }
    }
}

/// Severity of an event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Operator action required.
    Alarm,
    /// Equipment at risk.
    Critical,
}

impl EventSeverity {
    /// Returns the numeric code.
    pub fn code(self) -> u8 {
        match self {
            EventSeverity::Info => 0,
            EventSeverity::Warning => 1,
            EventSeverity::Alarm => 2,
            EventSeverity::Critical => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EventSeverity::Info),
            1 => Some(EventSeverity::Warning),
            2 => Some(EventSeverity::Alarm),
            3 => Some(EventSeverity::Critical),
            _ => None,
        }
    }
}

/// An event message.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Shared columns.
    pub header: LogHeader,
    /// Event type code.
    pub code: u32,
    /// Severity.
    pub severity: EventSeverity,
    /// Free-form message.
    pub text: String,
}

impl LogEvent {
    /// Creates an event.
    pub fn new(header: LogHeader, code: u32, severity: EventSeverity, text: impl Into<String>) -> Self {
        Self {
            header,
            code,
            severity,
            text: text.into(),
        }
    }
}

impl LogRecord for LogEvent {
    const KIND: LogKind = LogKind::Event;

    fn header(&self) -> &LogHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LogHeader {
        &mut self.header
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.code),
            Value::from(self.severity.code()),
            Value::from(self.text.as_str()),
        ]
    }

    fn from_payload(header: LogHeader, payload: &[Value]) -> LogResult<Self> {
        let severity_code = read_i64(Self::KIND, "severity", &payload[1])?;
        let severity = EventSeverity::from_code(severity_code).ok_or_else(|| {
            LogError::invalid_field(Self::KIND, "severity", format!("unknown severity {severity_code}"))
        })?;
        Ok(Self {
            header,
            code: read_u32(Self::KIND, "code", &payload[0])?,
            severity,
            text: read_text(Self::KIND, "text", &payload[2])?,
        })
    }

    fn into_batch(records: Vec<Self>) -> LogBatch {
        LogBatch::Event(records)
    }

    fn from_batch(batch: LogBatch) -> Result<Vec<Self>, LogBatch> {
        match batch {
            LogBatch::Event(records) => Ok(records),
            other => Err(other),
        }
    }
}

/// A parameter change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogParam {
    /// Shared columns.
    pub header: LogHeader,
    /// Device group owning the parameter.
    pub group_id: u32,
    /// Parameter id within the group.
    pub param_id: u32,
    /// New value, as text.
    pub value: String,
}

impl LogParam {
    /// Creates a parameter change.
    pub fn new(header: LogHeader, group_id: u32, param_id: u32, value: impl Into<String>) -> Self {
        Self {
            header,
            group_id,
            param_id,
            value: value.into(),
        }
    }
}

impl LogRecord for LogParam {
    const KIND: LogKind = LogKind::Param;

    fn header(&self) -> &LogHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LogHeader {
        &mut self.header
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.group_id),
            Value::from(self.param_id),
            Value::from(self.value.as_str()),
        ]
    }

    fn from_payload(header: LogHeader, payload: &[Value]) -> LogResult<Self> {
        Ok(Self {
            header,
            group_id: read_u32(Self::KIND, "group_id", &payload[0])?,
            param_id: read_u32(Self::KIND, "param_id", &payload[1])?,
            value: read_text(Self::KIND, "value", &payload[2])?,
        })
    }

    fn into_batch(records: Vec<Self>) -> LogBatch {
        LogBatch::Param(records)
    }

    fn from_batch(batch: LogBatch) -> Result<Vec<Self>, LogBatch> {
        match batch {
            LogBatch::Param(records) => Ok(records),
            other => Err(other),
        }
    }
}

/// A status transition.
///
/// `args` is stored as one column holding an array of text values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStatus {
    /// Shared columns.
    pub header: LogHeader,
    /// Device group the status applies to.
    pub group_id: u32,
    /// Status id.
    pub status_id: u32,
    /// Message arguments.
    pub args: Vec<String>,
    /// True when the status was cleared, false when it was raised.
    pub removed: bool,
}

impl LogStatus {
    /// Creates a raised status.
    pub fn raised(header: LogHeader, group_id: u32, status_id: u32, args: Vec<String>) -> Self {
        Self {
            header,
            group_id,
            status_id,
            args,
            removed: false,
        }
    }

    /// Creates a cleared status.
    pub fn cleared(header: LogHeader, group_id: u32, status_id: u32) -> Self {
        Self {
            header,
            group_id,
            status_id,
            args: Vec::new(),
            removed: true,
        }
    }
}

impl LogRecord for LogStatus {
    const KIND: LogKind = LogKind::Status;

    fn header(&self) -> &LogHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LogHeader {
        &mut self.header
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.group_id),
            Value::from(self.status_id),
            Value::Array(self.args.iter().cloned().map(Value::Text).collect()),
            Value::Bool(self.removed),
        ]
    }

    fn from_payload(header: LogHeader, payload: &[Value]) -> LogResult<Self> {
        let args = read_text_array(Self::KIND, "args", &payload[2])?;
        Ok(Self {
            header,
            group_id: read_u32(Self::KIND, "group_id", &payload[0])?,
            status_id: read_u32(Self::KIND, "status_id", &payload[1])?,
            args,
            removed: read_bool(Self::KIND, "removed", &payload[3])?,
        })
    }

    fn into_batch(records: Vec<Self>) -> LogBatch {
        LogBatch::Status(records)
    }

    fn from_batch(batch: LogBatch) -> Result<Vec<Self>, LogBatch> {
        match batch {
            LogBatch::Status(records) => Ok(records),
            other => Err(other),
        }
    }
}

/// An operating mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMode {
    /// Shared columns.
    pub header: LogHeader,
    /// Device group switching mode.
    pub group_id: u32,
    /// New mode.
    pub mode_id: u32,
}

impl LogMode {
    /// Creates a mode change.
    pub fn new(header: LogHeader, group_id: u32, mode_id: u32) -> Self {
        Self {
            header,
            group_id,
            mode_id,
        }
    }
}

impl LogRecord for LogMode {
    const KIND: LogKind = LogKind::Mode;

    fn header(&self) -> &LogHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LogHeader {
        &mut self.header
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![Value::from(self.group_id), Value::from(self.mode_id)]
    }

    fn from_payload(header: LogHeader, payload: &[Value]) -> LogResult<Self> {
        Ok(Self {
            header,
            group_id: read_u32(Self::KIND, "group_id", &payload[0])?,
            mode_id: read_u32(Self::KIND, "mode_id", &payload[1])?,
        })
    }

    fn into_batch(records: Vec<Self>) -> LogBatch {
        LogBatch::Mode(records)
    }

    fn from_batch(batch: LogBatch) -> Result<Vec<Self>, LogBatch> {
        match batch {
            LogBatch::Mode(records) => Ok(records),
            other => Err(other),
        }
    }
}
