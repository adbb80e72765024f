//! Study progress storage.

use chrono::{DateTime, Utc};
use flashcard_core::{Progress, Scheduler, Validate, MINIMUM_EASINESS};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::db::date_utils::{format_optional, format_timestamp};
use crate::db::decks::load_deck;
use crate::db::repository::{AnswerOutcome, ProgressRepository, Result, SqliteRepository};
use crate::db::rows::{accept_partial, RowReader, RowRecord};
use crate::db::stats;

pub(crate) const PROGRESS_COLUMNS: &str = "flashcard_id, deck_id, status, correct_count, \
     incorrect_count, repetition, easiness_factor, interval_days, next_review_at, \
     last_reviewed_at, created_at, updated_at, is_dirty";

const DEFAULT_EASINESS: f64 = 2.5;

const UPSERT_PROGRESS: &str = "INSERT INTO progress (flashcard_id, deck_id, status, correct_count,
        incorrect_count, repetition, easiness_factor, interval_days, next_review_at,
        last_reviewed_at, created_at, updated_at, is_dirty)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    ON CONFLICT(flashcard_id) DO UPDATE SET
        deck_id = excluded.deck_id,
        status = excluded.status,
        correct_count = excluded.correct_count,
        incorrect_count = excluded.incorrect_count,
        repetition = excluded.repetition,
        easiness_factor = excluded.easiness_factor,
        interval_days = excluded.interval_days,
        next_review_at = excluded.next_review_at,
        last_reviewed_at = COALESCE(excluded.last_reviewed_at, progress.last_reviewed_at),
        updated_at = excluded.updated_at,
        is_dirty = excluded.is_dirty
    WHERE progress.is_dirty = 0 OR excluded.is_dirty = 1";

pub(crate) fn progress_from_row(row: &Row) -> rusqlite::Result<RowRecord<Progress>> {
    let mut r = RowReader::new(row, "progress", "flashcard_id")?;
    let progress = Progress {
        flashcard_id: r.id(),
        deck_id: r.text("deck_id")?,
        status: r.status("status")?,
        correct_count: r.count("correct_count")?,
        incorrect_count: r.count("incorrect_count")?,
        repetition: r.count("repetition")?,
        easiness_factor: r.real("easiness_factor", DEFAULT_EASINESS)?,
        interval_days: r.real("interval_days", 0.0)?,
        next_review_at: r.opt_timestamp("next_review_at")?,
        last_reviewed_at: r.opt_timestamp("last_reviewed_at")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
        is_dirty: r.flag("is_dirty")?,
    };
    Ok(r.finish(progress).map_err(|mut partial| {
        let p = &mut partial.record;
        if !p.easiness_factor.is_finite() {
            p.easiness_factor = DEFAULT_EASINESS;
        }
        p.easiness_factor = p.easiness_factor.max(MINIMUM_EASINESS);
        if !p.interval_days.is_finite() || p.interval_days < 0.0 {
            p.interval_days = 0.0;
        }
        partial
    }))
}

pub(crate) fn load_progress(conn: &Connection, flashcard_id: &str) -> Result<Option<Progress>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM progress WHERE flashcard_id = ?1", PROGRESS_COLUMNS),
            params![flashcard_id],
            progress_from_row,
        )
        .optional()?;
    Ok(row.map(|p| accept_partial("progress", p)))
}

pub(crate) fn list_for_deck(conn: &Connection, deck_id: &str) -> Result<Vec<RowRecord<Progress>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM progress WHERE deck_id = ?1 ORDER BY flashcard_id",
        PROGRESS_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![deck_id], progress_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Merge-upsert progress. Returns the number of rows written.
pub(crate) fn upsert_progress(conn: &Connection, progress: &Progress) -> Result<usize> {
    progress.validate()?;
    let written = conn.execute(
        UPSERT_PROGRESS,
        params![
            progress.flashcard_id,
            progress.deck_id,
            progress.status.as_str(),
            progress.correct_count,
            progress.incorrect_count,
            progress.repetition,
            progress.easiness_factor,
            progress.interval_days,
            format_optional(progress.next_review_at),
            format_optional(progress.last_reviewed_at),
            format_timestamp(progress.created_at),
            format_timestamp(progress.updated_at),
            progress.is_dirty,
        ],
    )?;
    Ok(written)
}

/// Whether `flashcard_id` is one of the deck's cards.
fn card_in_deck(conn: &Connection, deck_id: &str, template_id: Option<&str>, flashcard_id: &str) -> Result<bool> {
    let found: Option<i64> = match template_id {
        Some(template_id) => conn
            .query_row(
                "SELECT 1 FROM template_flashcards WHERE id = ?1 AND deck_id = ?2",
                params![flashcard_id, template_id],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT 1 FROM flashcards WHERE id = ?1 AND deck_id = ?2",
                params![flashcard_id, deck_id],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(found.is_some())
}

impl ProgressRepository for SqliteRepository {
    fn get_progress(&self, flashcard_id: &str) -> Result<Option<Progress>> {
        load_progress(&self.conn, flashcard_id)
    }

    fn list_progress(&self, deck_id: &str) -> Result<Vec<RowRecord<Progress>>> {
        list_for_deck(&self.conn, deck_id)
    }

    fn upsert_progress(&self, progress: &Progress) -> Result<()> {
        upsert_progress(&self.conn, progress)?;
        Ok(())
    }

    fn record_answer(
        &self,
        scheduler: &Scheduler,
        deck_id: &str,
        flashcard_id: &str,
        passed: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AnswerOutcome>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(deck) = load_deck(&tx, deck_id)? else {
            warn!(deck_id, "answer recorded for unknown deck");
            return Ok(None);
        };
        if !card_in_deck(&tx, deck_id, deck.template_id.as_deref(), flashcard_id)? {
            warn!(deck_id, flashcard_id, "answer recorded for card outside deck");
            return Ok(None);
        }

        let current = load_progress(&tx, flashcard_id)?;
        let result = scheduler.apply_answer(current.as_ref(), flashcard_id, deck_id, passed, now);
        upsert_progress(&tx, &result.progress)?;

        let stats = if result.status_changed() {
            stats::transition(&tx, deck_id, result.previous_status, result.progress.status, now)?
                .unwrap_or_else(|| deck.stats())
        } else {
            deck.stats()
        };
        tx.commit()?;

        debug!(
            flashcard_id,
            passed,
            from = result.previous_status.as_str(),
            to = result.progress.status.as_str(),
            "answer recorded"
        );
        Ok(Some(AnswerOutcome {
            progress: result.progress,
            previous_status: result.previous_status,
            stats,
        }))
    }
}
