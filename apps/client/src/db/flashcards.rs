//! User and template flashcard storage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use flashcard_core::{EntityType, Flashcard, TemplateFlashcard, Validate, ValidationError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::date_utils::format_timestamp;
use crate::db::decks::load_deck;
use crate::db::deletions;
use crate::db::error::DbError;
use crate::db::repository::{
    FlashcardEdit, FlashcardRepository, NewFlashcard, Result, SqliteRepository,
};
use crate::db::rows::{accept_partial, RowReader, RowRecord};
use crate::db::stats;

pub(crate) const FLASHCARD_COLUMNS: &str = "id, deck_id, user_id, front_text, back_text, hint, \
     front_image, back_image, front_audio, back_audio, position, created_at, updated_at, is_dirty";

const TEMPLATE_COLUMNS: &str =
    "id, deck_id, front_text, back_text, front_image, back_image, position, created_at, updated_at";

const UPSERT_FLASHCARD: &str = "INSERT INTO flashcards (id, deck_id, user_id, front_text, back_text,
        hint, front_image, back_image, front_audio, back_audio, position, created_at, updated_at, is_dirty)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT(id) DO UPDATE SET
        deck_id = excluded.deck_id,
        user_id = excluded.user_id,
        front_text = COALESCE(NULLIF(excluded.front_text, ''), flashcards.front_text),
        back_text = COALESCE(NULLIF(excluded.back_text, ''), flashcards.back_text),
        hint = COALESCE(NULLIF(excluded.hint, ''), flashcards.hint),
        front_image = COALESCE(NULLIF(excluded.front_image, ''), flashcards.front_image),
        back_image = COALESCE(NULLIF(excluded.back_image, ''), flashcards.back_image),
        front_audio = COALESCE(NULLIF(excluded.front_audio, ''), flashcards.front_audio),
        back_audio = COALESCE(NULLIF(excluded.back_audio, ''), flashcards.back_audio),
        position = excluded.position,
        updated_at = excluded.updated_at,
        is_dirty = excluded.is_dirty
    WHERE flashcards.is_dirty = 0 OR excluded.is_dirty = 1";

pub(crate) fn flashcard_from_row(row: &Row) -> rusqlite::Result<RowRecord<Flashcard>> {
    let mut r = RowReader::new(row, "flashcard", "id")?;
    let card = Flashcard {
        id: r.id(),
        deck_id: r.text("deck_id")?,
        user_id: r.text("user_id")?,
        front_text: r.text("front_text")?,
        back_text: r.text("back_text")?,
        hint: r.opt_text("hint")?,
        front_image: r.opt_text("front_image")?,
        back_image: r.opt_text("back_image")?,
        front_audio: r.opt_text("front_audio")?,
        back_audio: r.opt_text("back_audio")?,
        position: r.count("position")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
        is_dirty: r.flag("is_dirty")?,
    };
    Ok(r.finish(card))
}

fn template_from_row(row: &Row) -> rusqlite::Result<RowRecord<TemplateFlashcard>> {
    let mut r = RowReader::new(row, "template_flashcard", "id")?;
    let card = TemplateFlashcard {
        id: r.id(),
        deck_id: r.text("deck_id")?,
        front_text: r.text("front_text")?,
        back_text: r.text("back_text")?,
        front_image: r.opt_text("front_image")?,
        back_image: r.opt_text("back_image")?,
        position: r.count("position")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
    };
    Ok(r.finish(card))
}

pub(crate) fn load_flashcard(conn: &Connection, id: &str) -> Result<Option<Flashcard>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM flashcards WHERE id = ?1", FLASHCARD_COLUMNS),
            params![id],
            flashcard_from_row,
        )
        .optional()?;
    Ok(row.map(|card| accept_partial("flashcards", card)))
}

pub(crate) fn list_for_deck(conn: &Connection, deck_id: &str) -> Result<Vec<RowRecord<Flashcard>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM flashcards WHERE deck_id = ?1 ORDER BY position, id",
        FLASHCARD_COLUMNS
    ))?;
    let cards = stmt
        .query_map(params![deck_id], flashcard_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(cards)
}

pub(crate) fn list_for_template(
    conn: &Connection,
    template_id: &str,
) -> Result<Vec<RowRecord<TemplateFlashcard>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM template_flashcards WHERE deck_id = ?1 ORDER BY position, id",
        TEMPLATE_COLUMNS
    ))?;
    let cards = stmt
        .query_map(params![template_id], template_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(cards)
}

/// Merge-upsert a card. Returns the number of rows written.
pub(crate) fn upsert_flashcard(conn: &Connection, card: &Flashcard) -> Result<usize> {
    card.validate()?;
    let written = conn.execute(
        UPSERT_FLASHCARD,
        params![
            card.id,
            card.deck_id,
            card.user_id,
            card.front_text,
            card.back_text,
            card.hint,
            card.front_image,
            card.back_image,
            card.front_audio,
            card.back_audio,
            card.position,
            format_timestamp(card.created_at),
            format_timestamp(card.updated_at),
            card.is_dirty,
        ],
    )?;
    Ok(written)
}

/// Template content is read-only locally; the incoming copy always wins.
pub(crate) fn write_template_cards(conn: &Connection, cards: &[TemplateFlashcard]) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "INSERT OR REPLACE INTO template_flashcards ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        TEMPLATE_COLUMNS
    ))?;
    for card in cards {
        card.validate()?;
        stmt.execute(params![
            card.id,
            card.deck_id,
            card.front_text,
            card.back_text,
            card.front_image,
            card.back_image,
            card.position,
            format_timestamp(card.created_at),
            format_timestamp(card.updated_at),
        ])?;
    }
    Ok(cards.len())
}

fn not_found(entity: &'static str, id: &str) -> DbError {
    DbError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn edited(current: &Option<String>, edit: &Option<String>) -> Option<String> {
    match edit {
        Some(_) => optional(edit),
        None => current.clone(),
    }
}

impl FlashcardRepository for SqliteRepository {
    fn get_flashcard(&self, id: &str) -> Result<Option<Flashcard>> {
        load_flashcard(&self.conn, id)
    }

    fn list_flashcards(&self, deck_id: &str) -> Result<Vec<RowRecord<Flashcard>>> {
        list_for_deck(&self.conn, deck_id)
    }

    fn list_template_flashcards(&self, template_id: &str) -> Result<Vec<RowRecord<TemplateFlashcard>>> {
        list_for_template(&self.conn, template_id)
    }

    fn create_flashcard(&self, deck_id: &str, card: &NewFlashcard, now: DateTime<Utc>) -> Result<Flashcard> {
        let tx = self.conn.unchecked_transaction()?;
        let deck = load_deck(&tx, deck_id)?.ok_or_else(|| not_found("deck", deck_id))?;
        if deck.is_template() {
            return Err(ValidationError::InvalidValue {
                entity: "deck",
                id: deck.id,
                field: "template_id",
                reason: "template decks are read-only".to_string(),
            }
            .into());
        }

        let last: u32 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) FROM flashcards WHERE deck_id = ?1",
            params![deck_id],
            |row| row.get(0),
        )?;

        let flashcard = Flashcard {
            id: Uuid::new_v4().to_string(),
            deck_id: deck.id.clone(),
            user_id: deck.user_id.clone(),
            front_text: card.front_text.trim().to_string(),
            back_text: card.back_text.trim().to_string(),
            hint: optional(&card.hint),
            front_image: optional(&card.front_image),
            back_image: optional(&card.back_image),
            front_audio: optional(&card.front_audio),
            back_audio: optional(&card.back_audio),
            position: last + 1,
            created_at: now,
            updated_at: now,
            is_dirty: true,
        };
        upsert_flashcard(&tx, &flashcard)?;
        stats::recount(&tx, deck_id, now)?;
        tx.commit()?;

        debug!(deck_id, flashcard_id = %flashcard.id, position = flashcard.position, "created flashcard");
        Ok(flashcard)
    }

    fn upsert_flashcard(&self, card: &Flashcard) -> Result<()> {
        upsert_flashcard(&self.conn, card)?;
        Ok(())
    }

    fn upsert_template_flashcards(&self, cards: &[TemplateFlashcard]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let written = write_template_cards(&tx, cards)?;
        tx.commit()?;
        Ok(written)
    }

    fn update_flashcard(&self, id: &str, edit: &FlashcardEdit, now: DateTime<Utc>) -> Result<Flashcard> {
        let mut card = load_flashcard(&self.conn, id)?.ok_or_else(|| not_found("flashcard", id))?;

        if let Some(front) = &edit.front_text {
            card.front_text = front.trim().to_string();
        }
        if let Some(back) = &edit.back_text {
            card.back_text = back.trim().to_string();
        }
        card.hint = edited(&card.hint, &edit.hint);
        card.front_image = edited(&card.front_image, &edit.front_image);
        card.back_image = edited(&card.back_image, &edit.back_image);
        card.front_audio = edited(&card.front_audio, &edit.front_audio);
        card.back_audio = edited(&card.back_audio, &edit.back_audio);
        card.updated_at = now;
        card.is_dirty = true;
        card.validate()?;

        self.conn.execute(
            "UPDATE flashcards SET front_text = ?1, back_text = ?2, hint = ?3, front_image = ?4,
                 back_image = ?5, front_audio = ?6, back_audio = ?7, updated_at = ?8, is_dirty = 1
             WHERE id = ?9",
            params![
                card.front_text,
                card.back_text,
                card.hint,
                card.front_image,
                card.back_image,
                card.front_audio,
                card.back_audio,
                format_timestamp(now),
                card.id,
            ],
        )?;
        Ok(card)
    }

    fn reorder_flashcards(&self, deck_id: &str, ordered_ids: &[String], now: DateTime<Utc>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let current: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT id FROM flashcards WHERE deck_id = ?1")?;
            let ids = stmt
                .query_map(params![deck_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            ids
        };
        let requested: HashSet<String> = ordered_ids.iter().cloned().collect();
        if requested.len() != ordered_ids.len() || requested != current {
            return Err(ValidationError::InvalidValue {
                entity: "deck",
                id: deck_id.to_string(),
                field: "position",
                reason: format!(
                    "reorder must list each of the deck's {} cards exactly once",
                    current.len()
                ),
            }
            .into());
        }

        let stamp = format_timestamp(now);
        let mut moved = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE flashcards SET position = ?1, updated_at = ?2, is_dirty = 1
                 WHERE id = ?3 AND deck_id = ?4 AND position != ?1",
            )?;
            for (index, id) in ordered_ids.iter().enumerate() {
                moved += stmt.execute(params![(index + 1) as u32, stamp, id, deck_id])?;
            }
        }
        stats::recount(&tx, deck_id, now)?;
        tx.commit()?;

        debug!(deck_id, moved, "reordered flashcards");
        Ok(())
    }

    fn delete_flashcard(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let located: Option<(String, u32)> = tx
            .query_row(
                "SELECT deck_id, position FROM flashcards WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((deck_id, position)) = located else {
            warn!(flashcard_id = id, "delete requested for unknown flashcard");
            return Ok(false);
        };

        tx.execute("DELETE FROM progress WHERE flashcard_id = ?1", params![id])?;
        tx.execute("DELETE FROM flashcards WHERE id = ?1", params![id])?;
        tx.execute(
            "UPDATE flashcards SET position = position - 1, updated_at = ?1, is_dirty = 1
             WHERE deck_id = ?2 AND position > ?3",
            params![format_timestamp(now), deck_id, position],
        )?;
        deletions::enqueue(&tx, EntityType::Flashcard, id, now)?;
        stats::recount(&tx, &deck_id, now)?;
        tx.commit()?;

        info!(flashcard_id = id, deck_id = %deck_id, "deleted flashcard");
        Ok(true)
    }
}
