//! Conversion between local records and remote JSON rows.

use flashcard_core::{Progress, Validate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::remote::RemoteTable;

/// Progress as stored remotely, tagged with its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    #[serde(flatten)]
    pub progress: Progress,
}

/// A row that could not be pushed or pulled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub table: &'static str,
    pub id: Option<String>,
    pub reason: String,
}

impl RejectedRow {
    pub fn new(table: &'static str, id: Option<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(table, id = id.as_deref().unwrap_or("?"), reason = %reason, "row rejected");
        Self { table, id, reason }
    }
}

pub fn encode<T: Serialize>(table: RemoteTable, record: &T) -> Result<Value, String> {
    serde_json::to_value(record).map_err(|e| format!("cannot encode {} row: {}", table.as_str(), e))
}

pub fn encode_progress(user_id: &str, progress: &Progress) -> Result<Value, String> {
    let row = ProgressRow {
        user_id: user_id.to_string(),
        progress: progress.clone(),
    };
    encode(RemoteTable::Progress, &row)
}

/// Deserialize and validate pulled rows, rejecting the bad ones individually.
pub fn decode<T>(table: RemoteTable, rows: Vec<Value>) -> (Vec<T>, Vec<RejectedRow>)
where
    T: DeserializeOwned + Validate,
{
    let mut accepted = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        let id = row
            .get(table.key_column())
            .and_then(Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<T>(row) {
            Ok(record) => match record.validate() {
                Ok(()) => accepted.push(record),
                Err(e) => rejected.push(RejectedRow::new(table.as_str(), id, e.to_string())),
            },
            Err(e) => rejected.push(RejectedRow::new(table.as_str(), id, e.to_string())),
        }
    }
    (accepted, rejected)
}

pub fn decode_progress(rows: Vec<Value>) -> (Vec<Progress>, Vec<RejectedRow>) {
    let mut accepted = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        let id = row
            .get("flashcard_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<ProgressRow>(row) {
            Ok(ProgressRow { progress, .. }) => match progress.validate() {
                Ok(()) => accepted.push(progress),
                Err(e) => rejected.push(RejectedRow::new("progress", id, e.to_string())),
            },
            Err(e) => rejected.push(RejectedRow::new("progress", id, e.to_string())),
        }
    }
    (accepted, rejected)
}
