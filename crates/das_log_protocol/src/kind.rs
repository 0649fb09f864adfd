//! Log kinds and their table layouts.

use crate::error::{LogError, LogResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five kinds of device log.
///
/// Each kind has its own table, insert field list, dead-letter file and
/// sync item. The numeric code is stable: it appears on the wire and in
/// dead-letter file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Device item readings.
    Value,
    /// Event messages.
    Event,
    /// Parameter changes.
    Param,
    /// Status transitions.
    Status,
    /// Operating mode changes.
    Mode,
}

/// Header columns shared by every kind, in insert order.
const HEADER_FIELDS: [&str; 3] = ["timestamp_msecs", "user_id", "scheme_id"];

impl LogKind {
    /// All kinds, in code order.
    pub const ALL: [LogKind; 5] = [
        LogKind::Value,
        LogKind::Event,
        LogKind::Param,
        LogKind::Status,
        LogKind::Mode,
    ];

    /// Returns the numeric code.
    pub fn code(self) -> u8 {
        match self {
            LogKind::Value => 1,
            LogKind::Event => 2,
            LogKind::Param => 3,
            LogKind::Status => 4,
            LogKind::Mode => 5,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: i64) -> LogResult<Self> {
        match code {
            1 => Ok(LogKind::Value),
            2 => Ok(LogKind::Event),
            3 => Ok(LogKind::Param),
            4 => Ok(LogKind::Status),
            5 => Ok(LogKind::Mode),
            other => Err(LogError::UnknownKind(other)),
        }
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            LogKind::Value => "value",
            LogKind::Event => "event",
            LogKind::Param => "param",
            LogKind::Status => "status",
            LogKind::Mode => "mode",
        }
    }

    /// Parses a short name as produced by [`LogKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Name of the table this kind is stored in.
    pub fn table_name(self) -> &'static str {
        match self {
            LogKind::Value => "log_value",
            LogKind::Event => "log_event",
            LogKind::Param => "log_param",
            LogKind::Status => "log_status",
            LogKind::Mode => "log_mode",
        }
    }

    /// Kind-specific columns, in insert order.
    pub fn payload_fields(self) -> &'static [&'static str] {
        match self {
            LogKind::Value => &["item_id", "value", "raw_value"],
            LogKind::Event => &["code", "severity", "text"],
            LogKind::Param => &["group_id", "param_id", "value"],
            LogKind::Status => &["group_id", "status_id", "args", "removed"],
            LogKind::Mode => &["group_id", "mode_id"],
        }
    }

    /// Full insert field list. The store-assigned `id` is never part of it.
    pub fn insert_fields(self) -> Vec<&'static str> {
        HEADER_FIELDS
            .iter()
            .chain(self.payload_fields())
            .copied()
            .collect()
    }

    /// Number of columns in an insert row.
    pub fn insert_width(self) -> usize {
        HEADER_FIELDS.len() + self.payload_fields().len()
    }

    /// Number of columns in a wire row (no `scheme_id`).
    pub fn wire_width(self) -> usize {
        self.insert_width() - 1
    }

    /// Dead-letter file name for this kind.
    pub fn dead_letter_file_name(self) -> String {
        format!("fail_log_{}.dat", self.code())
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
