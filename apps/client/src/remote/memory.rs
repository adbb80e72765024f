//! In-process remote store for tests and offline runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{RemoteError, RemoteStore, RemoteTable};

/// One request seen by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CurrentUser,
    Upsert { table: RemoteTable, count: usize },
    Delete { table: RemoteTable, id: String },
    Select { table: RemoteTable },
}

#[derive(Default)]
struct State {
    user: Option<String>,
    tables: HashMap<RemoteTable, BTreeMap<String, Value>>,
    failures: VecDeque<RemoteError>,
    table_failures: HashMap<RemoteTable, RemoteError>,
    calls: Vec<RemoteCall>,
}

/// Deterministic remote store with failure injection.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl RemoteCall {
    fn table(&self) -> Option<RemoteTable> {
        match self {
            Self::CurrentUser => None,
            Self::Upsert { table, .. } | Self::Delete { table, .. } | Self::Select { table } => {
                Some(*table)
            }
        }
    }
}

fn row_key(table: RemoteTable, row: &Value) -> Option<String> {
    row.get(table.key_column())?.as_str().map(str::to_string)
}

impl InMemoryRemote {
    /// Remote with a signed-in user.
    pub fn with_user(user_id: &str) -> Self {
        let remote = Self::default();
        remote.set_user(Some(user_id.to_string()));
        remote
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_user(&self, user_id: Option<String>) {
        self.state().user = user_id;
    }

    /// Fail the next request with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.state().failures.push_back(error);
    }

    pub fn fail_next_n(&self, n: usize, error: RemoteError) {
        let mut state = self.state();
        for _ in 0..n {
            state.failures.push_back(error.clone());
        }
    }

    /// Fail every request against `table` until [`InMemoryRemote::heal_table`].
    pub fn fail_table(&self, table: RemoteTable, error: RemoteError) {
        self.state().table_failures.insert(table, error);
    }

    pub fn heal_table(&self, table: RemoteTable) {
        self.state().table_failures.remove(&table);
    }

    /// Seed a row as if another device had written it.
    pub fn insert_row(&self, table: RemoteTable, row: Value) {
        if let Some(key) = row_key(table, &row) {
            self.state().tables.entry(table).or_default().insert(key, row);
        }
    }

    pub fn row(&self, table: RemoteTable, id: &str) -> Option<Value> {
        self.state().tables.get(&table)?.get(id).cloned()
    }

    pub fn rows(&self, table: RemoteTable) -> Vec<Value> {
        self.state()
            .tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    /// Log the call and pop an injected failure, if any.
    fn begin(&self, call: RemoteCall) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.state();
        let table = call.table();
        state.calls.push(call);
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        let failure = table.and_then(|table| state.table_failures.get(&table).cloned());
        match failure {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn current_user(&self) -> Result<Option<String>, RemoteError> {
        let state = self.begin(RemoteCall::CurrentUser)?;
        Ok(state.user.clone())
    }

    async fn upsert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteCall::Upsert {
            table,
            count: rows.len(),
        })?;
        for row in rows {
            let key = row_key(table, &row).ok_or_else(|| RemoteError::Client {
                status: 400,
                message: format!("{} row without {}", table.as_str(), table.key_column()),
            })?;
            let stored = state.tables.entry(table).or_default().entry(key).or_insert(Value::Null);
            match row {
                Value::Object(incoming) if stored.is_object() => {
                    if let Some(existing) = stored.as_object_mut() {
                        existing.extend(incoming);
                    }
                }
                row => *stored = row,
            }
        }
        Ok(())
    }

    /// Delete a row owned by `user_id`, cascading like the hosted schema's
    /// foreign keys: a deck takes its flashcards and progress with it, a
    /// flashcard takes its progress.
    async fn delete(&self, table: RemoteTable, id: &str, user_id: &str) -> Result<bool, RemoteError> {
        let mut state = self.begin(RemoteCall::Delete {
            table,
            id: id.to_string(),
        })?;
        let Some(rows) = state.tables.get_mut(&table) else {
            return Ok(false);
        };
        let owned = rows
            .get(id)
            .and_then(|row| row.get("user_id"))
            .and_then(Value::as_str)
            .map_or(false, |owner| owner == user_id);
        if !owned || rows.remove(id).is_none() {
            return Ok(false);
        }

        match table {
            RemoteTable::UserDecks => {
                for child in [RemoteTable::Flashcards, RemoteTable::Progress] {
                    if let Some(rows) = state.tables.get_mut(&child) {
                        rows.retain(|_, row| row.get("deck_id").and_then(Value::as_str) != Some(id));
                    }
                }
            }
            RemoteTable::Flashcards => {
                if let Some(progress) = state.tables.get_mut(&RemoteTable::Progress) {
                    progress.remove(id);
                }
            }
            RemoteTable::CustomDecks | RemoteTable::Progress => {}
        }
        Ok(true)
    }

    async fn select_by_user(&self, table: RemoteTable, user_id: &str) -> Result<Vec<Value>, RemoteError> {
        let state = self.begin(RemoteCall::Select { table })?;
        Ok(state
            .tables
            .get(&table)
            .map(|rows| {
                rows.values()
                    .filter(|row| row.get("user_id").and_then(Value::as_str) == Some(user_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
