//! Repository pattern for database access.

use chrono::{DateTime, Utc};
use flashcard_core::{
    CardContent, CustomDeckMetadata, Deck, DeletionTombstone, EntityType, Flashcard, Progress,
    ProgressStatus, Scheduler, StatusCounts, TemplateDeck, TemplateFlashcard,
};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

use crate::db::error::DbError;
use crate::db::migrations;
use crate::db::rows::RowRecord;

pub(crate) type Result<T> = std::result::Result<T, DbError>;

/// Repository for deck operations.
pub trait DeckRepository {
    /// Best-effort deck; issues are logged.
    fn get_deck(&self, id: &str) -> Result<Option<Deck>>;
    fn list_decks(&self, user_id: &str) -> Result<Vec<RowRecord<Deck>>>;
    /// Upsert with the merge-on-conflict policy.
    fn upsert_deck(&self, deck: &Deck) -> Result<()>;
    fn create_custom_deck(&self, user_id: &str, name: &str, now: DateTime<Utc>) -> Result<Deck>;
    fn update_deck_details(&self, deck_id: &str, edit: &DeckEdit, now: DateTime<Utc>) -> Result<Deck>;
    /// Adopt a shared template, returning the existing deck if already adopted.
    fn adopt_template(
        &self,
        user_id: &str,
        template: &TemplateDeck,
        cards: &[TemplateFlashcard],
        now: DateTime<Utc>,
    ) -> Result<Deck>;
    /// Delete a deck with its flashcards, progress and metadata, and
    /// tombstone it. Returns `false` if the deck did not exist.
    fn delete_deck_cascade(&self, deck_id: &str, now: DateTime<Utc>) -> Result<bool>;
    fn get_custom_metadata(&self, deck_id: &str) -> Result<Option<CustomDeckMetadata>>;
    fn upsert_custom_metadata(&self, metadata: &CustomDeckMetadata) -> Result<()>;
}

/// Repository for flashcard operations.
pub trait FlashcardRepository {
    fn get_flashcard(&self, id: &str) -> Result<Option<Flashcard>>;
    /// Cards of a custom deck ordered by position.
    fn list_flashcards(&self, deck_id: &str) -> Result<Vec<RowRecord<Flashcard>>>;
    fn list_template_flashcards(&self, template_id: &str) -> Result<Vec<RowRecord<TemplateFlashcard>>>;
    /// Append a card at the end of a custom deck.
    fn create_flashcard(&self, deck_id: &str, card: &NewFlashcard, now: DateTime<Utc>) -> Result<Flashcard>;
    fn upsert_flashcard(&self, card: &Flashcard) -> Result<()>;
    fn upsert_template_flashcards(&self, cards: &[TemplateFlashcard]) -> Result<usize>;
    fn update_flashcard(&self, id: &str, edit: &FlashcardEdit, now: DateTime<Utc>) -> Result<Flashcard>;
    /// Rewrite positions as `1..=N` in the given order. `ordered_ids` must be
    /// a permutation of the deck's cards.
    fn reorder_flashcards(&self, deck_id: &str, ordered_ids: &[String], now: DateTime<Utc>) -> Result<()>;
    /// Delete a card and its progress, close the position gap and tombstone
    /// it. Returns `false` if the card did not exist.
    fn delete_flashcard(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
}

/// Repository for progress operations.
pub trait ProgressRepository {
    fn get_progress(&self, flashcard_id: &str) -> Result<Option<Progress>>;
    fn list_progress(&self, deck_id: &str) -> Result<Vec<RowRecord<Progress>>>;
    fn upsert_progress(&self, progress: &Progress) -> Result<()>;
    /// Schedule an answer and apply the stats delta in one transaction.
    /// Returns `None` if the deck or card is unknown.
    fn record_answer(
        &self,
        scheduler: &Scheduler,
        deck_id: &str,
        flashcard_id: &str,
        passed: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AnswerOutcome>>;
}

/// Repository for statistics and study queue operations.
pub trait StatsRepository {
    /// Recount a deck's cards by status. `None` if the deck is unknown.
    fn recalculate_stats(&self, deck_id: &str, now: DateTime<Utc>) -> Result<Option<StatusCounts>>;
    /// Apply one status change to the stored counters.
    fn apply_stats_transition(
        &self,
        deck_id: &str,
        from: ProgressStatus,
        to: ProgressStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusCounts>>;
    fn get_deck_stats(&self, deck_id: &str) -> Result<Option<StatusCounts>>;
    fn get_study_queue(&self, deck_id: &str, now: DateTime<Utc>) -> Result<Vec<StudyCard>>;
    fn get_due_count(&self, deck_id: &str, now: DateTime<Utc>) -> Result<u32>;
}

/// Durable queue of local deletions awaiting remote confirmation.
pub trait DeletionQueue {
    /// Returns `true` if a new tombstone was written.
    fn enqueue_deletion(&self, entity_type: EntityType, entity_id: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Oldest first.
    fn list_pending_deletions(&self) -> Result<Vec<DeletionTombstone>>;
    /// Returns `false` if no such tombstone was pending.
    fn clear_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<bool>;
    fn has_pending_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<bool>;
}

/// Repository for sync operations.
pub trait SyncRepository {
    fn dirty_snapshot(&self) -> Result<DirtySnapshot>;
    /// Clear the dirty bit of rows whose `updated_at` still matches the
    /// snapshot version. Returns the number of rows cleared.
    fn clear_dirty(&self, table: DirtyTable, rows: &[(String, String)]) -> Result<usize>;
    /// Apply pulled rows in one transaction and recount affected decks.
    fn apply_remote(&self, batch: &RemoteBatch, now: DateTime<Utc>) -> Result<ApplyReport>;
}

/// Editable deck fields. `None` leaves a field unchanged; an empty string
/// clears an optional field.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DeckEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub cover_image: Option<String>,
    pub tags: Option<Vec<String>>,
    pub difficulty: Option<String>,
}

/// Content of a card to create.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NewFlashcard {
    pub front_text: String,
    pub back_text: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub back_image: Option<String>,
    #[serde(default)]
    pub front_audio: Option<String>,
    #[serde(default)]
    pub back_audio: Option<String>,
}

/// Editable card fields, same conventions as [`DeckEdit`].
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FlashcardEdit {
    pub front_text: Option<String>,
    pub back_text: Option<String>,
    pub hint: Option<String>,
    pub front_image: Option<String>,
    pub back_image: Option<String>,
    pub front_audio: Option<String>,
    pub back_audio: Option<String>,
}

/// Result of recording an answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub progress: Progress,
    pub previous_status: ProgressStatus,
    pub stats: StatusCounts,
}

/// A card in the study queue.
#[derive(Debug, Clone, Serialize)]
pub struct StudyCard {
    pub card: CardContent,
    pub status: ProgressStatus,
    pub progress: Option<Progress>,
    pub due: bool,
}

/// Dirty row with the raw `updated_at` it was read at.
#[derive(Debug, Clone)]
pub struct DirtyRow<T> {
    pub record: RowRecord<T>,
    pub version: String,
}

/// Every dirty row, by table.
#[derive(Debug, Clone, Default)]
pub struct DirtySnapshot {
    pub custom_decks: Vec<DirtyRow<CustomDeckMetadata>>,
    pub decks: Vec<DirtyRow<Deck>>,
    pub flashcards: Vec<DirtyRow<Flashcard>>,
    pub progress: Vec<DirtyRow<Progress>>,
}

impl DirtySnapshot {
    pub fn len(&self) -> usize {
        self.custom_decks.len() + self.decks.len() + self.flashcards.len() + self.progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Local tables carrying a dirty bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyTable {
    CustomDeckMetadata,
    Decks,
    Flashcards,
    Progress,
}

impl DirtyTable {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CustomDeckMetadata => "custom_deck_metadata",
            Self::Decks => "decks",
            Self::Flashcards => "flashcards",
            Self::Progress => "progress",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Progress => "flashcard_id",
            _ => "id",
        }
    }
}

/// Validated rows pulled from the remote store.
#[derive(Debug, Clone, Default)]
pub struct RemoteBatch {
    pub custom_decks: Vec<CustomDeckMetadata>,
    pub decks: Vec<Deck>,
    pub flashcards: Vec<Flashcard>,
    pub progress: Vec<Progress>,
}

/// Outcome of applying a pulled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    /// Rows kept because the local copy is dirty.
    pub kept_local: usize,
    /// Rows skipped because a local deletion is pending.
    pub skipped_deleted: usize,
    /// Cards and progress whose deck or card is not present locally.
    pub skipped_orphaned: usize,
    pub decks_recounted: usize,
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    pub(crate) conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection and bring it to the current schema.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Create missing tables and run pending migrations. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        migrations::initialize(&self.conn)
    }

    pub fn schema_version(&self) -> Result<i32> {
        migrations::current_version(&self.conn)
    }

    /// Underlying connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
