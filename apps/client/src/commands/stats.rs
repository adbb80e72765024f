//! Deck statistics commands.

use chrono::Utc;
use flashcard_core::StatusCounts;

use crate::db::StatsRepository;
use crate::state::AppState;

use super::CommandError;

/// Recount a deck's status counters from its cards.
pub async fn recalculate_stats(state: &AppState, deck_id: &str) -> Result<StatusCounts, CommandError> {
    let repo = state.repo()?;
    repo.recalculate_stats(deck_id, Utc::now())?
        .ok_or_else(|| CommandError::new(format!("Deck not found: {}", deck_id)))
}

pub async fn get_deck_stats(state: &AppState, deck_id: &str) -> Result<Option<StatusCounts>, CommandError> {
    let repo = state.repo()?;
    repo.get_deck_stats(deck_id).map_err(Into::into)
}
