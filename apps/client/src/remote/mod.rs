//! Remote store contract.
//!
//! Rows travel as JSON objects so the engine can validate each one on its
//! own and drop the malformed ones without failing a whole batch.

pub mod error;
pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{ErrorKind, RemoteError};
pub use memory::{InMemoryRemote, RemoteCall};
pub use supabase::SupabaseRemote;

/// Tables mirrored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemoteTable {
    CustomDecks,
    UserDecks,
    Flashcards,
    Progress,
}

impl RemoteTable {
    /// Push order: parents before children.
    pub const ALL: [RemoteTable; 4] = [
        Self::CustomDecks,
        Self::UserDecks,
        Self::Flashcards,
        Self::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomDecks => "custom_decks",
            Self::UserDecks => "user_decks",
            Self::Flashcards => "flashcards",
            Self::Progress => "progress",
        }
    }

    /// Primary key column.
    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Progress => "flashcard_id",
            _ => "id",
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Id of the signed-in user, `None` without a session.
    async fn current_user(&self) -> Result<Option<String>, RemoteError>;

    /// Insert or merge rows by primary key.
    async fn upsert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError>;

    /// Delete one of the user's rows. Returns `false` if nothing matched.
    async fn delete(&self, table: RemoteTable, id: &str, user_id: &str) -> Result<bool, RemoteError>;

    async fn select_by_user(&self, table: RemoteTable, user_id: &str) -> Result<Vec<Value>, RemoteError>;
}
