//! Sync-related commands.

use chrono::Utc;
use flashcard_core::EntityType;

use crate::db::{DeckRepository, DeletionQueue, FlashcardRepository};
use crate::state::AppState;
use crate::sync::{PullReport, SyncStatus};

use super::CommandError;

/// Push local changes. `false` if a sync is already running or anything failed.
pub async fn sync_to_cloud(state: &AppState) -> bool {
    state.sync.sync_to_cloud().await
}

pub async fn sync_from_remote(state: &AppState, user_id: &str) -> Result<PullReport, CommandError> {
    state.sync.sync_from_remote(user_id).await.map_err(Into::into)
}

pub async fn get_sync_status(state: &AppState) -> SyncStatus {
    state.sync.status().await
}

fn entity_type(name: &str) -> Result<EntityType, CommandError> {
    EntityType::from_str(name).ok_or_else(|| CommandError::new(format!("Unknown entity type: {}", name)))
}

/// Delete an entity locally and queue its remote deletion in one step.
///
/// An entity that is already gone locally only gets a tombstone, so rows
/// left behind remotely still converge. `false` if nothing new was queued.
pub async fn enqueue_deletion(
    state: &AppState,
    entity_type_name: &str,
    entity_id: &str,
) -> Result<bool, CommandError> {
    let entity_type = entity_type(entity_type_name)?;
    let now = Utc::now();
    let repo = state.repo()?;
    let deleted = match entity_type {
        EntityType::Flashcard => repo.delete_flashcard(entity_id, now)?,
        EntityType::Deck => repo.delete_deck_cascade(entity_id, now)?,
    };
    if deleted {
        return Ok(true);
    }
    repo.enqueue_deletion(entity_type, entity_id, now)
        .map_err(Into::into)
}

pub async fn clear_deletion(
    state: &AppState,
    entity_type_name: &str,
    entity_id: &str,
) -> Result<bool, CommandError> {
    let entity_type = entity_type(entity_type_name)?;
    let repo = state.repo()?;
    repo.clear_deletion(entity_type, entity_id)
        .map_err(Into::into)
}
