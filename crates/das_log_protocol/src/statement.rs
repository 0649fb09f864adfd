//! Bulk insert statements.

use crate::kind::LogKind;
use das_codec::Value;

/// One bulk insert into a log table.
///
/// Carries the table, the field list (never `id`), the row count and the
/// values flattened row after row. A store either executes the statement
/// as a whole or fails it as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Kind the rows belong to.
    pub kind: LogKind,
    /// Target table.
    pub table: &'static str,
    /// Column names, in value order.
    pub fields: Vec<&'static str>,
    /// Number of rows.
    pub row_count: usize,
    /// Values, `row_count * fields.len()` of them.
    pub values: Vec<Value>,
}

impl InsertStatement {
    /// Builds a statement from insert rows of the given kind.
    ///
    /// Rows are expected to be [`LogKind::insert_width`] wide.
    pub fn from_rows(kind: LogKind, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        let mut row_count = 0;
        let mut values = Vec::new();
        for row in rows {
            values.extend(row);
            row_count += 1;
        }
        Self {
            kind,
            table: kind.table_name(),
            fields: kind.insert_fields(),
            row_count,
            values,
        }
    }

    /// Returns true if there is nothing to insert.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Iterates over the rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.values.chunks(self.fields.len().max(1))
    }

    /// Renders the statement as SQL with positional placeholders.
    ///
    /// ```
    /// use das_log_protocol::{InsertStatement, LogKind};
    /// use das_codec::Value;
    ///
    /// let row = vec![Value::Integer(0); LogKind::Mode.insert_width()];
    /// let statement = InsertStatement::from_rows(LogKind::Mode, vec![row.clone(), row]);
    /// assert_eq!(
    ///     statement.sql(),
    ///     "INSERT INTO log_mode(timestamp_msecs,user_id,scheme_id,group_id,mode_id) \
    ///      VALUES (?,?,?,?,?),(?,?,?,?,?)"
    /// );
    /// ```
    pub fn sql(&self) -> String {
        let placeholders = format!("({})", vec!["?"; self.fields.len()].join(","));
        let rows = vec![placeholders.as_str(); self.row_count].join(",");
        format!(
            "INSERT INTO {}({}) VALUES {}",
            self.table,
            self.fields.join(","),
            rows
        )
    }
}
