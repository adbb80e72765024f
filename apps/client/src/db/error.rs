//! Database error types.

use flashcard_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid data: {0}")]
    Validation(#[from] ValidationError),

    #[error("database is corrupt: {0}")]
    Corrupt(String),

    #[error("repository lock poisoned")]
    LockPoisoned,
}
