//! Study session commands.

use chrono::Utc;

use crate::db::{AnswerOutcome, ProgressRepository, StatsRepository, StudyCard};
use crate::state::AppState;

use super::CommandError;

/// Cards of a deck in study order.
pub async fn get_study_queue(state: &AppState, deck_id: &str) -> Result<Vec<StudyCard>, CommandError> {
    let repo = state.repo()?;
    repo.get_study_queue(deck_id, Utc::now())
        .map_err(Into::into)
}

pub async fn get_due_count(state: &AppState, deck_id: &str) -> Result<u32, CommandError> {
    let repo = state.repo()?;
    repo.get_due_count(deck_id, Utc::now())
        .map_err(Into::into)
}

/// Record a pass or fail for a card and return its new progress and the
/// deck's counters.
pub async fn apply_answer(
    state: &AppState,
    deck_id: &str,
    flashcard_id: &str,
    passed: bool,
) -> Result<AnswerOutcome, CommandError> {
    let repo = state.repo()?;
    repo.record_answer(&state.scheduler, deck_id, flashcard_id, passed, Utc::now())?
        .ok_or_else(|| {
            CommandError::new(format!(
                "Flashcard {} not found in deck {}",
                flashcard_id, deck_id
            ))
        })
}
