//! Deck and flashcard editing commands.

use chrono::Utc;
use flashcard_core::{Deck, Flashcard, TemplateDeck, TemplateFlashcard};

use crate::db::rows::accept_partial;
use crate::db::{DeckEdit, DeckRepository, FlashcardEdit, FlashcardRepository, NewFlashcard};
use crate::state::AppState;

use super::CommandError;

/// List the user's decks. Rows with repairable problems are returned as read.
pub async fn list_decks(state: &AppState, user_id: &str) -> Result<Vec<Deck>, CommandError> {
    let repo = state.repo()?;
    Ok(repo
        .list_decks(user_id)?
        .into_iter()
        .map(|row| accept_partial("decks", row))
        .collect())
}

pub async fn create_deck(state: &AppState, user_id: &str, name: String) -> Result<Deck, CommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::new("Deck name cannot be empty"));
    }
    let repo = state.repo()?;
    repo.create_custom_deck(user_id, name, Utc::now())
        .map_err(Into::into)
}

pub async fn update_deck(
    state: &AppState,
    deck_id: &str,
    edit: DeckEdit,
) -> Result<Deck, CommandError> {
    let repo = state.repo()?;
    repo.update_deck_details(deck_id, &edit, Utc::now())
        .map_err(Into::into)
}

/// Delete a deck with its cards and progress. `false` if it did not exist.
pub async fn delete_deck(state: &AppState, deck_id: &str) -> Result<bool, CommandError> {
    let repo = state.repo()?;
    repo.delete_deck_cascade(deck_id, Utc::now())
        .map_err(Into::into)
}

/// Copy a template deck into the user's library.
pub async fn adopt_template(
    state: &AppState,
    user_id: &str,
    template: TemplateDeck,
    cards: Vec<TemplateFlashcard>,
) -> Result<Deck, CommandError> {
    let repo = state.repo()?;
    repo.adopt_template(user_id, &template, &cards, Utc::now())
        .map_err(Into::into)
}

pub async fn list_flashcards(state: &AppState, deck_id: &str) -> Result<Vec<Flashcard>, CommandError> {
    let repo = state.repo()?;
    Ok(repo
        .list_flashcards(deck_id)?
        .into_iter()
        .map(|row| accept_partial("flashcards", row))
        .collect())
}

pub async fn create_flashcard(
    state: &AppState,
    deck_id: &str,
    card: NewFlashcard,
) -> Result<Flashcard, CommandError> {
    let repo = state.repo()?;
    repo.create_flashcard(deck_id, &card, Utc::now())
        .map_err(Into::into)
}

pub async fn update_flashcard(
    state: &AppState,
    flashcard_id: &str,
    edit: FlashcardEdit,
) -> Result<Flashcard, CommandError> {
    let repo = state.repo()?;
    repo.update_flashcard(flashcard_id, &edit, Utc::now())
        .map_err(Into::into)
}

/// Set card order. `ordered_ids` must list every card of the deck once.
pub async fn reorder_flashcards(
    state: &AppState,
    deck_id: &str,
    ordered_ids: Vec<String>,
) -> Result<(), CommandError> {
    let repo = state.repo()?;
    repo.reorder_flashcards(deck_id, &ordered_ids, Utc::now())
        .map_err(Into::into)
}

pub async fn delete_flashcard(state: &AppState, flashcard_id: &str) -> Result<bool, CommandError> {
    let repo = state.repo()?;
    repo.delete_flashcard(flashcard_id, Utc::now())
        .map_err(Into::into)
}
