//! Best-effort typed row mapping.
//!
//! A malformed column never fails a whole query. The reader substitutes a
//! safe default, remembers what was wrong, and the caller gets either a fully
//! valid record or a [`PartialRecord`] carrying the issues.

use chrono::{DateTime, Utc};
use flashcard_core::{ProgressStatus, Validate, ValidationError};
use rusqlite::types::ValueRef;
use rusqlite::Row;
use tracing::warn;

use crate::db::date_utils::parse_timestamp;

/// `Ok` for a valid record, `Err` for a best-effort one.
pub type RowRecord<T> = std::result::Result<T, PartialRecord<T>>;

/// Record assembled with defaults for unreadable or invalid columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord<T> {
    pub record: T,
    pub issues: Vec<ValidationError>,
}

/// The record either way.
pub fn into_record<T>(row: RowRecord<T>) -> T {
    match row {
        Ok(record) => record,
        Err(partial) => partial.record,
    }
}

/// The record either way, logging why it was only partially readable.
pub(crate) fn accept_partial<T>(table: &'static str, row: RowRecord<T>) -> T {
    match row {
        Ok(record) => record,
        Err(partial) => {
            warn!(table, issues = ?partial.issues, "using best-effort record");
            partial.record
        }
    }
}

/// Validate a record, attaching issues already found while reading it.
pub fn checked<T: Validate>(record: T, mut issues: Vec<ValidationError>) -> RowRecord<T> {
    issues.extend(record.issues());
    if issues.is_empty() {
        Ok(record)
    } else {
        Err(PartialRecord { record, issues })
    }
}

/// Column reader that records problems instead of failing.
pub(crate) struct RowReader<'a, 'stmt> {
    row: &'a Row<'stmt>,
    entity: &'static str,
    id: String,
    issues: Vec<ValidationError>,
}

impl<'a, 'stmt> RowReader<'a, 'stmt> {
    pub fn new(row: &'a Row<'stmt>, entity: &'static str, id_column: &str) -> rusqlite::Result<Self> {
        let id = match row.get_ref(id_column)? {
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ValueRef::Integer(i) => i.to_string(),
            _ => String::new(),
        };
        Ok(Self {
            row,
            entity,
            id,
            issues: Vec::new(),
        })
    }

    pub fn id(&self) -> String {
        self.id.clone()
    }

    fn invalid(&mut self, field: &'static str, reason: impl Into<String>) {
        self.issues.push(ValidationError::InvalidValue {
            entity: self.entity,
            id: self.id.clone(),
            field,
            reason: reason.into(),
        });
    }

    /// Text column. NULL reads as empty; required-ness is checked by validation.
    pub fn text(&mut self, column: &'static str) -> rusqlite::Result<String> {
        Ok(match self.row.get_ref(column)? {
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ValueRef::Integer(i) => i.to_string(),
            ValueRef::Real(f) => f.to_string(),
            ValueRef::Null => String::new(),
            ValueRef::Blob(_) => {
                self.invalid(column, "expected text, found blob");
                String::new()
            }
        })
    }

    /// Optional text column. Empty strings read as `None`.
    pub fn opt_text(&mut self, column: &'static str) -> rusqlite::Result<Option<String>> {
        let value = self.text(column)?;
        Ok(if value.trim().is_empty() {
            None
        } else {
            Some(value)
        })
    }

    pub fn count(&mut self, column: &'static str) -> rusqlite::Result<u32> {
        let value = match self.row.get_ref(column)? {
            ValueRef::Integer(i) => Some(i),
            ValueRef::Real(f) if f.is_finite() => Some(f as i64),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().parse::<i64>().ok(),
            ValueRef::Null => Some(0),
            _ => None,
        };
        match value.map(u32::try_from) {
            Some(Ok(n)) => Ok(n),
            Some(Err(_)) => {
                self.invalid(column, "out of range");
                Ok(0)
            }
            None => {
                self.invalid(column, "not an integer");
                Ok(0)
            }
        }
    }

    pub fn real(&mut self, column: &'static str, default: f64) -> rusqlite::Result<f64> {
        let value = match self.row.get_ref(column)? {
            ValueRef::Real(f) => Some(f),
            ValueRef::Integer(i) => Some(i as f64),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().parse::<f64>().ok(),
            ValueRef::Null => Some(default),
            ValueRef::Blob(_) => None,
        };
        match value {
            Some(f) => Ok(f),
            None => {
                self.invalid(column, "not a number");
                Ok(default)
            }
        }
    }

    pub fn flag(&mut self, column: &'static str) -> rusqlite::Result<bool> {
        Ok(match self.row.get_ref(column)? {
            ValueRef::Integer(i) => i != 0,
            ValueRef::Real(f) => f != 0.0,
            ValueRef::Text(bytes) => matches!(bytes, b"1" | b"true" | b"TRUE"),
            ValueRef::Null | ValueRef::Blob(_) => false,
        })
    }

    /// Required timestamp; unreadable values fall back to the Unix epoch.
    pub fn timestamp(&mut self, column: &'static str) -> rusqlite::Result<DateTime<Utc>> {
        match self.opt_timestamp(column)? {
            Some(ts) => Ok(ts),
            None => {
                if !self.has_issue(column) {
                    self.invalid(column, "missing timestamp");
                }
                Ok(DateTime::<Utc>::default())
            }
        }
    }

    pub fn opt_timestamp(&mut self, column: &'static str) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.opt_text(column)? else {
            return Ok(None);
        };
        match parse_timestamp(&raw) {
            Some(ts) => Ok(Some(ts)),
            None => {
                self.invalid(column, format!("unparsable timestamp `{}`", raw));
                Ok(None)
            }
        }
    }

    /// Tags stored as a JSON array.
    pub fn tags(&mut self, column: &'static str) -> rusqlite::Result<Vec<String>> {
        let raw = self.text(column)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(tags) => Ok(tags),
            Err(e) => {
                self.invalid(column, e.to_string());
                Ok(Vec::new())
            }
        }
    }

    pub fn status(&mut self, column: &'static str) -> rusqlite::Result<ProgressStatus> {
        let raw = self.text(column)?;
        match ProgressStatus::from_str(raw.trim()) {
            Some(status) => Ok(status),
            None => {
                self.invalid(column, format!("unknown status `{}`", raw));
                Ok(ProgressStatus::New)
            }
        }
    }

    fn has_issue(&self, column: &str) -> bool {
        self.issues.iter().any(|issue| {
            matches!(issue, ValidationError::InvalidValue { field, .. } if *field == column)
        })
    }

    /// Finish the row: validate the assembled record.
    pub fn finish<T: Validate>(self, record: T) -> RowRecord<T> {
        checked(record, self.issues)
    }
}

/// Serialize tags for storage.
pub fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}
