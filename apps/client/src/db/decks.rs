//! Deck and custom deck metadata storage.

use chrono::{DateTime, Utc};
use flashcard_core::{
    CustomDeckMetadata, Deck, EntityType, TemplateDeck, TemplateFlashcard, Validate,
    ValidationError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::date_utils::format_timestamp;
use crate::db::deletions;
use crate::db::error::DbError;
use crate::db::flashcards;
use crate::db::repository::{DeckEdit, DeckRepository, Result, SqliteRepository};
use crate::db::rows::{accept_partial, tags_to_json, RowReader, RowRecord};
use crate::db::stats;

pub(crate) const DECK_COLUMNS: &str = "id, user_id, template_id, is_custom, name, description, \
     language, cover_image, tags, difficulty, flashcard_count, stats_new, stats_learning, \
     stats_review, stats_mastered, created_at, updated_at, is_dirty";

pub(crate) const METADATA_COLUMNS: &str = "id, user_id, name, description, language, cover_image, \
     tags, is_active, created_at, updated_at, is_dirty";

const UPSERT_DECK: &str = "INSERT INTO decks (id, user_id, template_id, is_custom, name, description,
        language, cover_image, tags, difficulty, flashcard_count, stats_new, stats_learning,
        stats_review, stats_mastered, created_at, updated_at, is_dirty)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
    ON CONFLICT(id) DO UPDATE SET
        user_id = excluded.user_id,
        template_id = COALESCE(excluded.template_id, decks.template_id),
        is_custom = excluded.is_custom,
        name = COALESCE(NULLIF(excluded.name, ''), decks.name),
        description = COALESCE(NULLIF(excluded.description, ''), decks.description),
        language = COALESCE(NULLIF(excluded.language, ''), decks.language),
        cover_image = COALESCE(NULLIF(excluded.cover_image, ''), decks.cover_image),
        tags = CASE WHEN excluded.tags IN ('', '[]') THEN decks.tags ELSE excluded.tags END,
        difficulty = COALESCE(NULLIF(excluded.difficulty, ''), decks.difficulty),
        flashcard_count = CASE WHEN excluded.flashcard_count = 0
            THEN decks.flashcard_count ELSE excluded.flashcard_count END,
        stats_new = CASE WHEN excluded.stats_new + excluded.stats_learning
                + excluded.stats_review + excluded.stats_mastered = 0
            THEN decks.stats_new ELSE excluded.stats_new END,
        stats_learning = CASE WHEN excluded.stats_new + excluded.stats_learning
                + excluded.stats_review + excluded.stats_mastered = 0
            THEN decks.stats_learning ELSE excluded.stats_learning END,
        stats_review = CASE WHEN excluded.stats_new + excluded.stats_learning
                + excluded.stats_review + excluded.stats_mastered = 0
            THEN decks.stats_review ELSE excluded.stats_review END,
        stats_mastered = CASE WHEN excluded.stats_new + excluded.stats_learning
                + excluded.stats_review + excluded.stats_mastered = 0
            THEN decks.stats_mastered ELSE excluded.stats_mastered END,
        updated_at = excluded.updated_at,
        is_dirty = excluded.is_dirty
    WHERE decks.is_dirty = 0 OR excluded.is_dirty = 1";

const UPSERT_METADATA: &str = "INSERT INTO custom_deck_metadata (id, user_id, name, description,
        language, cover_image, tags, is_active, created_at, updated_at, is_dirty)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        user_id = excluded.user_id,
        name = COALESCE(NULLIF(excluded.name, ''), custom_deck_metadata.name),
        description = COALESCE(NULLIF(excluded.description, ''), custom_deck_metadata.description),
        language = COALESCE(NULLIF(excluded.language, ''), custom_deck_metadata.language),
        cover_image = COALESCE(NULLIF(excluded.cover_image, ''), custom_deck_metadata.cover_image),
        tags = CASE WHEN excluded.tags IN ('', '[]') THEN custom_deck_metadata.tags ELSE excluded.tags END,
        is_active = excluded.is_active,
        updated_at = excluded.updated_at,
        is_dirty = excluded.is_dirty
    WHERE custom_deck_metadata.is_dirty = 0 OR excluded.is_dirty = 1";

pub(crate) fn deck_from_row(row: &Row) -> rusqlite::Result<RowRecord<Deck>> {
    let mut r = RowReader::new(row, "deck", "id")?;
    let deck = Deck {
        id: r.id(),
        user_id: r.text("user_id")?,
        template_id: r.opt_text("template_id")?,
        is_custom: r.flag("is_custom")?,
        name: r.text("name")?,
        description: r.opt_text("description")?,
        language: r.opt_text("language")?,
        cover_image: r.opt_text("cover_image")?,
        tags: r.tags("tags")?,
        difficulty: r.opt_text("difficulty")?,
        flashcard_count: r.count("flashcard_count")?,
        stats_new: r.count("stats_new")?,
        stats_learning: r.count("stats_learning")?,
        stats_review: r.count("stats_review")?,
        stats_mastered: r.count("stats_mastered")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
        is_dirty: r.flag("is_dirty")?,
    };
    Ok(r.finish(deck))
}

pub(crate) fn metadata_from_row(row: &Row) -> rusqlite::Result<RowRecord<CustomDeckMetadata>> {
    let mut r = RowReader::new(row, "custom_deck", "id")?;
    let metadata = CustomDeckMetadata {
        id: r.id(),
        user_id: r.text("user_id")?,
        name: r.text("name")?,
        description: r.opt_text("description")?,
        language: r.opt_text("language")?,
        cover_image: r.opt_text("cover_image")?,
        tags: r.tags("tags")?,
        is_active: r.flag("is_active")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
        is_dirty: r.flag("is_dirty")?,
    };
    Ok(r.finish(metadata))
}

pub(crate) fn load_deck(conn: &Connection, id: &str) -> Result<Option<Deck>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM decks WHERE id = ?1", DECK_COLUMNS),
            params![id],
            deck_from_row,
        )
        .optional()?;
    Ok(row.map(|deck| accept_partial("decks", deck)))
}

pub(crate) fn load_metadata(conn: &Connection, id: &str) -> Result<Option<CustomDeckMetadata>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM custom_deck_metadata WHERE id = ?1", METADATA_COLUMNS),
            params![id],
            metadata_from_row,
        )
        .optional()?;
    Ok(row.map(|metadata| accept_partial("custom_deck_metadata", metadata)))
}

/// Merge-upsert a deck. Returns the number of rows written, zero when a
/// clean incoming row met a dirty local one.
pub(crate) fn upsert_deck(conn: &Connection, deck: &Deck) -> Result<usize> {
    deck.validate()?;
    let written = conn.execute(
        UPSERT_DECK,
        params![
            deck.id,
            deck.user_id,
            deck.template_id,
            deck.is_custom,
            deck.name,
            deck.description,
            deck.language,
            deck.cover_image,
            tags_to_json(&deck.tags),
            deck.difficulty,
            deck.flashcard_count,
            deck.stats_new,
            deck.stats_learning,
            deck.stats_review,
            deck.stats_mastered,
            format_timestamp(deck.created_at),
            format_timestamp(deck.updated_at),
            deck.is_dirty,
        ],
    )?;
    Ok(written)
}

pub(crate) fn upsert_metadata(conn: &Connection, metadata: &CustomDeckMetadata) -> Result<usize> {
    metadata.validate()?;
    let written = conn.execute(
        UPSERT_METADATA,
        params![
            metadata.id,
            metadata.user_id,
            metadata.name,
            metadata.description,
            metadata.language,
            metadata.cover_image,
            tags_to_json(&metadata.tags),
            metadata.is_active,
            format_timestamp(metadata.created_at),
            format_timestamp(metadata.updated_at),
            metadata.is_dirty,
        ],
    )?;
    Ok(written)
}

/// Overwrite metadata as-is, cleared fields included.
fn replace_metadata(conn: &Connection, metadata: &CustomDeckMetadata) -> Result<()> {
    metadata.validate()?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO custom_deck_metadata ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            METADATA_COLUMNS
        ),
        params![
            metadata.id,
            metadata.user_id,
            metadata.name,
            metadata.description,
            metadata.language,
            metadata.cover_image,
            tags_to_json(&metadata.tags),
            metadata.is_active,
            format_timestamp(metadata.created_at),
            format_timestamp(metadata.updated_at),
            metadata.is_dirty,
        ],
    )?;
    Ok(())
}

fn not_found(id: &str) -> DbError {
    DbError::NotFound {
        entity: "deck",
        id: id.to_string(),
    }
}

/// Edited optional text: empty clears, `None` keeps.
fn edited(current: &Option<String>, edit: &Option<String>) -> Option<String> {
    match edit {
        Some(value) if value.trim().is_empty() => None,
        Some(value) => Some(value.trim().to_string()),
        None => current.clone(),
    }
}

impl DeckRepository for SqliteRepository {
    fn get_deck(&self, id: &str) -> Result<Option<Deck>> {
        load_deck(&self.conn, id)
    }

    fn list_decks(&self, user_id: &str) -> Result<Vec<RowRecord<Deck>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM decks WHERE user_id = ?1 ORDER BY created_at, id",
            DECK_COLUMNS
        ))?;
        let decks = stmt
            .query_map(params![user_id], deck_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(decks)
    }

    fn upsert_deck(&self, deck: &Deck) -> Result<()> {
        upsert_deck(&self.conn, deck)?;
        Ok(())
    }

    fn create_custom_deck(&self, user_id: &str, name: &str, now: DateTime<Utc>) -> Result<Deck> {
        let deck = Deck::new_custom(
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            name.trim().to_string(),
            now,
        );
        deck.validate()?;
        let mut metadata = CustomDeckMetadata::for_deck(&deck);
        metadata.is_dirty = true;

        let tx = self.conn.unchecked_transaction()?;
        upsert_deck(&tx, &deck)?;
        replace_metadata(&tx, &metadata)?;
        tx.commit()?;

        info!(deck_id = %deck.id, "created custom deck");
        Ok(deck)
    }

    fn update_deck_details(&self, deck_id: &str, edit: &DeckEdit, now: DateTime<Utc>) -> Result<Deck> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deck = load_deck(&tx, deck_id)?.ok_or_else(|| not_found(deck_id))?;

        if let Some(name) = &edit.name {
            deck.name = name.trim().to_string();
        }
        deck.description = edited(&deck.description, &edit.description);
        deck.language = edited(&deck.language, &edit.language);
        deck.cover_image = edited(&deck.cover_image, &edit.cover_image);
        deck.difficulty = edited(&deck.difficulty, &edit.difficulty);
        if let Some(tags) = &edit.tags {
            deck.tags = tags.clone();
        }
        deck.updated_at = now;
        deck.is_dirty = true;
        deck.validate()?;

        tx.execute(
            "UPDATE decks SET name = ?1, description = ?2, language = ?3, cover_image = ?4,
                 tags = ?5, difficulty = ?6, updated_at = ?7, is_dirty = 1
             WHERE id = ?8",
            params![
                deck.name,
                deck.description,
                deck.language,
                deck.cover_image,
                tags_to_json(&deck.tags),
                deck.difficulty,
                format_timestamp(now),
                deck.id,
            ],
        )?;

        if deck.is_custom {
            let mut metadata = CustomDeckMetadata::for_deck(&deck);
            if let Some(existing) = load_metadata(&tx, deck_id)? {
                metadata.created_at = existing.created_at;
                metadata.is_active = existing.is_active;
            }
            replace_metadata(&tx, &metadata)?;
        }
        tx.commit()?;

        debug!(deck_id, "updated deck details");
        Ok(deck)
    }

    fn adopt_template(
        &self,
        user_id: &str,
        template: &TemplateDeck,
        cards: &[TemplateFlashcard],
        now: DateTime<Utc>,
    ) -> Result<Deck> {
        if let Some(card) = cards.iter().find(|c| c.deck_id != template.id) {
            return Err(ValidationError::InvalidValue {
                entity: "template_flashcard",
                id: card.id.clone(),
                field: "deck_id",
                reason: format!("belongs to {}, not {}", card.deck_id, template.id),
            }
            .into());
        }

        let tx = self.conn.unchecked_transaction()?;
        flashcards::write_template_cards(&tx, cards)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM decks WHERE user_id = ?1 AND template_id = ?2",
                params![user_id, template.id],
                |row| row.get(0),
            )
            .optional()?;

        let deck_id = match existing {
            Some(id) => {
                debug!(deck_id = %id, template_id = %template.id, "template already adopted");
                id
            }
            None => {
                let deck = Deck {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    template_id: Some(template.id.clone()),
                    is_custom: false,
                    name: template.name.clone(),
                    description: template.description.clone(),
                    language: template.language.clone(),
                    cover_image: template.cover_image.clone(),
                    tags: template.tags.clone(),
                    difficulty: template.difficulty.clone(),
                    flashcard_count: 0,
                    stats_new: 0,
                    stats_learning: 0,
                    stats_review: 0,
                    stats_mastered: 0,
                    created_at: now,
                    updated_at: now,
                    is_dirty: true,
                };
                upsert_deck(&tx, &deck)?;
                info!(deck_id = %deck.id, template_id = %template.id, cards = cards.len(), "adopted template");
                deck.id
            }
        };

        stats::recount(&tx, &deck_id, now)?;
        let deck = load_deck(&tx, &deck_id)?.ok_or_else(|| not_found(&deck_id))?;
        tx.commit()?;
        Ok(deck)
    }

    fn delete_deck_cascade(&self, deck_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        if load_deck(&tx, deck_id)?.is_none() {
            warn!(deck_id, "delete requested for unknown deck");
            return Ok(false);
        }

        let card_ids = {
            let mut stmt = tx.prepare("SELECT id FROM flashcards WHERE deck_id = ?1")?;
            let ids = stmt
                .query_map(params![deck_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };

        let progress = tx.execute(
            "DELETE FROM progress WHERE deck_id = ?1
                OR flashcard_id IN (SELECT id FROM flashcards WHERE deck_id = ?1)",
            params![deck_id],
        )?;
        let cards = tx.execute("DELETE FROM flashcards WHERE deck_id = ?1", params![deck_id])?;
        tx.execute("DELETE FROM custom_deck_metadata WHERE id = ?1", params![deck_id])?;
        tx.execute("DELETE FROM decks WHERE id = ?1", params![deck_id])?;
        // Cards and their progress are removed remotely by id, not by deck.
        for card_id in &card_ids {
            deletions::enqueue(&tx, EntityType::Flashcard, card_id, now)?;
        }
        deletions::enqueue(&tx, EntityType::Deck, deck_id, now)?;
        tx.commit()?;

        info!(deck_id, cards, progress, "deleted deck");
        Ok(true)
    }

    fn get_custom_metadata(&self, deck_id: &str) -> Result<Option<CustomDeckMetadata>> {
        load_metadata(&self.conn, deck_id)
    }

    fn upsert_custom_metadata(&self, metadata: &CustomDeckMetadata) -> Result<()> {
        upsert_metadata(&self.conn, metadata)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DeletionQueue, FlashcardRepository, NewFlashcard};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn repo() -> SqliteRepository {
        SqliteRepository::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_custom_deck_writes_metadata() {
        let repo = repo();
        let deck = repo.create_custom_deck("user-1", "  Spanish  ", now()).unwrap();
        assert_eq!(deck.name, "Spanish");

        let stored = repo.get_deck(&deck.id).unwrap().unwrap();
        assert!(stored.is_dirty);
        assert!(stored.is_custom);

        let metadata = repo.get_custom_metadata(&deck.id).unwrap().unwrap();
        assert_eq!(metadata.name, "Spanish");
        assert!(metadata.is_dirty);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let repo = repo();
        let err = repo.create_custom_deck("user-1", "   ", now()).unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn test_update_details_can_clear_optional_fields() {
        let repo = repo();
        let deck = repo.create_custom_deck("user-1", "Spanish", now()).unwrap();
        let edit = DeckEdit {
            description: Some("Basics".into()),
            tags: Some(vec!["es".into()]),
            ..Default::default()
        };
        repo.update_deck_details(&deck.id, &edit, now()).unwrap();

        let clear = DeckEdit {
            description: Some(String::new()),
            ..Default::default()
        };
        let updated = repo.update_deck_details(&deck.id, &clear, now()).unwrap();
        assert_eq!(updated.description, None);
        assert_eq!(updated.tags, vec!["es".to_string()]);

        let metadata = repo.get_custom_metadata(&deck.id).unwrap().unwrap();
        assert_eq!(metadata.description, None);
    }

    #[test]
    fn test_update_unknown_deck_is_not_found() {
        let repo = repo();
        let err = repo
            .update_deck_details("missing", &DeckEdit::default(), now())
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "deck", .. }));
    }

    #[test]
    fn test_clean_upsert_does_not_overwrite_dirty_deck() {
        let repo = repo();
        let local = repo.create_custom_deck("user-1", "Local name", now()).unwrap();

        let mut remote = local.clone();
        remote.name = "Remote name".into();
        remote.is_dirty = false;
        repo.upsert_deck(&remote).unwrap();

        assert_eq!(repo.get_deck(&local.id).unwrap().unwrap().name, "Local name");
    }

    #[test]
    fn test_upsert_keeps_existing_display_fields_and_stats() {
        let repo = repo();
        let mut deck = Deck::new_custom("deck-1".into(), "user-1".into(), "Spanish".into(), now());
        deck.description = Some("Basics".into());
        deck.tags = vec!["es".into()];
        deck.flashcard_count = 3;
        deck.stats_new = 2;
        deck.stats_review = 1;
        deck.is_dirty = false;
        repo.upsert_deck(&deck).unwrap();

        let mut incoming = deck.clone();
        incoming.description = None;
        incoming.tags = Vec::new();
        incoming.flashcard_count = 0;
        incoming.set_stats(Default::default());
        repo.upsert_deck(&incoming).unwrap();

        let stored = repo.get_deck("deck-1").unwrap().unwrap();
        assert_eq!(stored.description.as_deref(), Some("Basics"));
        assert_eq!(stored.tags, vec!["es".to_string()]);
        assert_eq!(stored.flashcard_count, 3);
        assert_eq!((stored.stats_new, stored.stats_review), (2, 1));
    }

    #[test]
    fn test_adopt_template_counts_cards_once() {
        let repo = repo();
        let template = TemplateDeck {
            id: "tpl-1".into(),
            name: "Top 100 verbs".into(),
            description: None,
            language: Some("es".into()),
            cover_image: None,
            tags: vec![],
            difficulty: Some("beginner".into()),
        };
        let cards: Vec<TemplateFlashcard> = (1..=3)
            .map(|i| TemplateFlashcard {
                id: format!("tc-{}", i),
                deck_id: "tpl-1".into(),
                front_text: format!("front {}", i),
                back_text: format!("back {}", i),
                front_image: None,
                back_image: None,
                position: i,
                created_at: now(),
                updated_at: now(),
            })
            .collect();

        let deck = repo.adopt_template("user-1", &template, &cards, now()).unwrap();
        assert_eq!(deck.template_id.as_deref(), Some("tpl-1"));
        assert!(!deck.is_custom);
        assert_eq!(deck.flashcard_count, 3);
        assert_eq!(deck.stats_new, 3);

        let again = repo.adopt_template("user-1", &template, &cards, now()).unwrap();
        assert_eq!(again.id, deck.id);
        assert_eq!(repo.list_decks("user-1").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_deck_cascades_and_tombstones() {
        let repo = repo();
        let deck = repo.create_custom_deck("user-1", "Spanish", now()).unwrap();
        let card = NewFlashcard {
            front_text: "perro".into(),
            back_text: "dog".into(),
            ..Default::default()
        };
        let card = repo.create_flashcard(&deck.id, &card, now()).unwrap();

        assert!(repo.delete_deck_cascade(&deck.id, now()).unwrap());
        assert!(repo.get_deck(&deck.id).unwrap().is_none());
        assert!(repo.get_flashcard(&card.id).unwrap().is_none());
        assert!(repo.get_custom_metadata(&deck.id).unwrap().is_none());
        assert!(repo.has_pending_deletion(EntityType::Deck, &deck.id).unwrap());
        assert!(repo.has_pending_deletion(EntityType::Flashcard, &card.id).unwrap());
        assert_eq!(repo.list_pending_deletions().unwrap().len(), 2);

        assert!(!repo.delete_deck_cascade(&deck.id, now()).unwrap());
    }
}
