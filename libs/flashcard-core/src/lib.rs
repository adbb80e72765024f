//! Core flashcard library used by the sync client.
//!
//! Provides:
//! - Shared record types (Deck, Flashcard, Progress, tombstones)
//! - Record validation
//! - The progress scheduler and its named strategies
//! - Per-deck status counters

pub mod error;
pub mod scheduler;
pub mod stats;
pub mod types;
pub mod validation;

pub use error::{Result, ValidationError};
pub use scheduler::{get_scheduler, Scheduler, SchedulerConfig, SchedulingResult, Strategy};
pub use stats::StatusCounts;
pub use types::{
    CardContent, CustomDeckMetadata, Deck, DeletionTombstone, EntityType, Flashcard, Progress,
    ProgressStatus, TemplateDeck, TemplateFlashcard,
};
pub use validation::{Validate, MINIMUM_EASINESS};
