//! Core types for the flashcard sync client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::StatusCounts;

/// Study status of a flashcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    New,
    Learning,
    Review,
    Mastered,
}

impl Default for ProgressStatus {
    fn default() -> Self {
        Self::New
    }
}

impl ProgressStatus {
    pub const ALL: [ProgressStatus; 4] = [Self::New, Self::Learning, Self::Review, Self::Mastered];

    /// Get the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Mastered => "mastered",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "learning" => Some(Self::Learning),
            "review" => Some(Self::Review),
            "mastered" => Some(Self::Mastered),
            _ => None,
        }
    }
}

/// Kind of entity a deletion tombstone refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Deck,
    Flashcard,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deck => "deck",
            Self::Flashcard => "flashcard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deck" => Some(Self::Deck),
            "flashcard" => Some(Self::Flashcard),
            _ => None,
        }
    }
}

/// A deck as owned by one user.
///
/// Adopted template decks carry `template_id` and read their cards from the
/// shared template; custom decks own their flashcards directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
    pub is_custom: bool,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub flashcard_count: u32,
    #[serde(default)]
    pub stats_new: u32,
    #[serde(default)]
    pub stats_learning: u32,
    #[serde(default)]
    pub stats_review: u32,
    #[serde(default)]
    pub stats_mastered: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub is_dirty: bool,
}

impl Deck {
    /// Create a user-authored deck with empty stats.
    pub fn new_custom(id: String, user_id: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            template_id: None,
            is_custom: true,
            name,
            description: None,
            language: None,
            cover_image: None,
            tags: Vec::new(),
            difficulty: None,
            flashcard_count: 0,
            stats_new: 0,
            stats_learning: 0,
            stats_review: 0,
            stats_mastered: 0,
            created_at: now,
            updated_at: now,
            is_dirty: true,
        }
    }

    /// Aggregate study counters.
    pub fn stats(&self) -> StatusCounts {
        StatusCounts {
            new: self.stats_new,
            learning: self.stats_learning,
            review: self.stats_review,
            mastered: self.stats_mastered,
        }
    }

    pub fn set_stats(&mut self, stats: StatusCounts) {
        self.stats_new = stats.new;
        self.stats_learning = stats.learning;
        self.stats_review = stats.review;
        self.stats_mastered = stats.mastered;
    }

    /// Whether the deck's cards come from a read-only template.
    pub fn is_template(&self) -> bool {
        self.template_id.is_some()
    }
}

/// Metadata kept for decks the user authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomDeckMetadata {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub is_dirty: bool,
}

impl CustomDeckMetadata {
    /// Build metadata mirroring a custom deck's display fields.
    pub fn for_deck(deck: &Deck) -> Self {
        Self {
            id: deck.id.clone(),
            user_id: deck.user_id.clone(),
            name: deck.name.clone(),
            description: deck.description.clone(),
            language: deck.language.clone(),
            cover_image: deck.cover_image.clone(),
            tags: deck.tags.clone(),
            is_active: true,
            created_at: deck.created_at,
            updated_at: deck.updated_at,
            is_dirty: deck.is_dirty,
        }
    }
}

/// User-authored flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub deck_id: String,
    pub user_id: String,
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
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub is_dirty: bool,
}

/// Read-only flashcard belonging to a shared template deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFlashcard {
    pub id: String,
    /// Template deck id.
    pub deck_id: String,
    pub front_text: String,
    pub back_text: String,
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub back_image: Option<String>,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shared template deck definition a user can adopt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDeck {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// Card content as seen by a study session, whichever table it lives in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardContent {
    Custom(Flashcard),
    Template(TemplateFlashcard),
}

impl CardContent {
    pub fn id(&self) -> &str {
        match self {
            Self::Custom(card) => &card.id,
            Self::Template(card) => &card.id,
        }
    }

    pub fn position(&self) -> u32 {
        match self {
            Self::Custom(card) => card.position,
            Self::Template(card) => card.position,
        }
    }

    pub fn front_text(&self) -> &str {
        match self {
            Self::Custom(card) => &card.front_text,
            Self::Template(card) => &card.front_text,
        }
    }
}

/// Study progress for one flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub flashcard_id: String,
    pub deck_id: String,
    pub status: ProgressStatus,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub repetition: u32,
    pub easiness_factor: f64,
    pub interval_days: f64,
    #[serde(default)]
    pub next_review_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub is_dirty: bool,
}

impl Progress {
    /// Implicit progress of a card that was never answered.
    pub fn new(flashcard_id: &str, deck_id: &str, easiness_factor: f64, now: DateTime<Utc>) -> Self {
        Self {
            flashcard_id: flashcard_id.to_string(),
            deck_id: deck_id.to_string(),
            status: ProgressStatus::New,
            correct_count: 0,
            incorrect_count: 0,
            repetition: 0,
            easiness_factor,
            interval_days: 0.0,
            next_review_at: None,
            last_reviewed_at: None,
            created_at: now,
            updated_at: now,
            is_dirty: false,
        }
    }

    /// Whether the card belongs in the current study queue.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ProgressStatus::Learning => true,
            ProgressStatus::Review => self.next_review_at.map_or(true, |due| due <= now),
            ProgressStatus::New | ProgressStatus::Mastered => false,
        }
    }
}

/// Pending remote deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionTombstone {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
}
