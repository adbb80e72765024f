//! Command handlers for UI collaborators.
//!
//! Each handler takes the shared [`AppState`](crate::state::AppState), locks
//! the repository only for synchronous work, and reports failures as a
//! serializable [`CommandError`].

pub mod deck;
pub mod stats;
pub mod study;
pub mod sync;

use flashcard_core::ValidationError;

use crate::db::DbError;
use crate::sync::SyncError;

pub use deck::{
    adopt_template, create_deck, create_flashcard, delete_deck, delete_flashcard, list_decks,
    list_flashcards, reorder_flashcards, update_deck, update_flashcard,
};
pub use stats::{get_deck_stats, recalculate_stats};
pub use study::{apply_answer, get_due_count, get_study_queue};
pub use sync::{clear_deletion, enqueue_deletion, get_sync_status, sync_from_remote, sync_to_cloud};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CommandError {
    pub message: String,
}

impl CommandError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<DbError> for CommandError {
    fn from(e: DbError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<ValidationError> for CommandError {
    fn from(e: ValidationError) -> Self {
        Self::new(e.to_string())
    }
}
