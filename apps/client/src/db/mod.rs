//! Local SQLite database operations.

pub mod date_utils;
mod decks;
mod deletions;
pub mod error;
mod flashcards;
pub mod migrations;
mod progress;
pub mod repository;
pub mod rows;
pub mod schema;
mod stats;
mod sync;

pub use error::DbError;
pub use repository::{
    AnswerOutcome, ApplyReport, DeckEdit, DeckRepository, DeletionQueue, DirtyRow, DirtySnapshot,
    DirtyTable, FlashcardEdit, FlashcardRepository, NewFlashcard, ProgressRepository,
    RemoteBatch, SqliteRepository, StatsRepository, StudyCard, SyncRepository,
};
pub use rows::{into_record, PartialRecord, RowRecord};
