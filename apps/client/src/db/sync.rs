//! Dirty-row snapshots and application of pulled rows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use flashcard_core::EntityType;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::db::decks::{deck_from_row, metadata_from_row, upsert_deck, upsert_metadata, DECK_COLUMNS, METADATA_COLUMNS};
use crate::db::deletions::is_pending;
use crate::db::flashcards::{flashcard_from_row, upsert_flashcard, FLASHCARD_COLUMNS};
use crate::db::progress::{progress_from_row, upsert_progress, PROGRESS_COLUMNS};
use crate::db::repository::{
    ApplyReport, DirtyRow, DirtySnapshot, DirtyTable, RemoteBatch, Result, SqliteRepository,
    SyncRepository,
};
use crate::db::rows::RowRecord;
use crate::db::stats;

fn exists(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let found = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
        params![id],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn dirty_rows<T>(
    conn: &Connection,
    table: DirtyTable,
    columns: &str,
    map: fn(&Row) -> rusqlite::Result<RowRecord<T>>,
) -> Result<Vec<DirtyRow<T>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE is_dirty = 1 ORDER BY updated_at, {}",
        columns,
        table.name(),
        table.key_column()
    ))?;
    let rows = stmt
        .query_map([], |row| {
            let version = row.get::<_, Option<String>>("updated_at")?.unwrap_or_default();
            Ok(DirtyRow {
                record: map(row)?,
                version,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Tally one merge-upsert result.
fn tally(report: &mut ApplyReport, written: usize) {
    if written > 0 {
        report.applied += 1;
    } else {
        report.kept_local += 1;
    }
}

impl SyncRepository for SqliteRepository {
    fn dirty_snapshot(&self) -> Result<DirtySnapshot> {
        Ok(DirtySnapshot {
            custom_decks: dirty_rows(
                &self.conn,
                DirtyTable::CustomDeckMetadata,
                METADATA_COLUMNS,
                metadata_from_row,
            )?,
            decks: dirty_rows(&self.conn, DirtyTable::Decks, DECK_COLUMNS, deck_from_row)?,
            flashcards: dirty_rows(
                &self.conn,
                DirtyTable::Flashcards,
                FLASHCARD_COLUMNS,
                flashcard_from_row,
            )?,
            progress: dirty_rows(&self.conn, DirtyTable::Progress, PROGRESS_COLUMNS, progress_from_row)?,
        })
    }

    fn clear_dirty(&self, table: DirtyTable, rows: &[(String, String)]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut cleared = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET is_dirty = 0 WHERE {} = ?1 AND updated_at = ?2 AND is_dirty = 1",
                table.name(),
                table.key_column()
            ))?;
            for (id, version) in rows {
                cleared += stmt.execute(params![id, version])?;
            }
        }
        tx.commit()?;

        if cleared < rows.len() {
            debug!(
                table = table.name(),
                confirmed = rows.len(),
                cleared,
                "rows changed after snapshot stay dirty"
            );
        }
        Ok(cleared)
    }

    fn apply_remote(&self, batch: &RemoteBatch, now: DateTime<Utc>) -> Result<ApplyReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = ApplyReport::default();
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for metadata in &batch.custom_decks {
            if is_pending(&tx, EntityType::Deck, &metadata.id)? {
                report.skipped_deleted += 1;
                continue;
            }
            let mut metadata = metadata.clone();
            metadata.is_dirty = false;
            tally(&mut report, upsert_metadata(&tx, &metadata)?);
        }

        for deck in &batch.decks {
            if is_pending(&tx, EntityType::Deck, &deck.id)? {
                report.skipped_deleted += 1;
                continue;
            }
            let mut deck = deck.clone();
            deck.is_dirty = false;
            tally(&mut report, upsert_deck(&tx, &deck)?);
            touched.insert(deck.id);
        }

        for card in &batch.flashcards {
            if is_pending(&tx, EntityType::Flashcard, &card.id)?
                || is_pending(&tx, EntityType::Deck, &card.deck_id)?
            {
                report.skipped_deleted += 1;
                continue;
            }
            if !exists(&tx, "decks", &card.deck_id)? {
                debug!(flashcard_id = %card.id, deck_id = %card.deck_id, "skipped card without local deck");
                report.skipped_orphaned += 1;
                continue;
            }
            let mut card = card.clone();
            card.is_dirty = false;
            tally(&mut report, upsert_flashcard(&tx, &card)?);
            touched.insert(card.deck_id);
        }

        for progress in &batch.progress {
            if is_pending(&tx, EntityType::Flashcard, &progress.flashcard_id)?
                || is_pending(&tx, EntityType::Deck, &progress.deck_id)?
            {
                report.skipped_deleted += 1;
                continue;
            }
            if !exists(&tx, "decks", &progress.deck_id)?
                || !exists(&tx, "flashcards", &progress.flashcard_id)?
            {
                debug!(flashcard_id = %progress.flashcard_id, "skipped progress without local card");
                report.skipped_orphaned += 1;
                continue;
            }
            let mut progress = progress.clone();
            progress.is_dirty = false;
            tally(&mut report, upsert_progress(&tx, &progress)?);
            touched.insert(progress.deck_id);
        }

        for deck_id in &touched {
            if stats::recount(&tx, deck_id, now)?.is_some() {
                report.decks_recounted += 1;
            }
        }
        tx.commit()?;

        info!(
            applied = report.applied,
            kept_local = report.kept_local,
            skipped_deleted = report.skipped_deleted,
            skipped_orphaned = report.skipped_orphaned,
            decks_recounted = report.decks_recounted,
            "applied remote rows"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::rows::into_record;
    use crate::db::{DeckRepository, FlashcardRepository, NewFlashcard};
    use chrono::{Duration, TimeZone};
    use flashcard_core::{Deck, Flashcard};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn remote_card(id: &str, deck_id: &str, position: u32) -> Flashcard {
        Flashcard {
            id: id.into(),
            deck_id: deck_id.into(),
            user_id: "user-1".into(),
            front_text: format!("{} front", id),
            back_text: format!("{} back", id),
            hint: None,
            front_image: None,
            back_image: None,
            front_audio: None,
            back_audio: None,
            position,
            created_at: now(),
            updated_at: now(),
            is_dirty: false,
        }
    }

    #[test]
    fn test_snapshot_lists_dirty_rows_with_versions() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_custom_deck("user-1", "Spanish", now()).unwrap();
        let card = NewFlashcard {
            front_text: "uno".into(),
            back_text: "one".into(),
            ..Default::default()
        };
        repo.create_flashcard(&deck.id, &card, now()).unwrap();

        let snapshot = repo.dirty_snapshot().unwrap();
        assert_eq!(snapshot.decks.len(), 1);
        assert_eq!(snapshot.custom_decks.len(), 1);
        assert_eq!(snapshot.flashcards.len(), 1);
        assert!(snapshot.progress.is_empty());
        assert!(!snapshot.decks[0].version.is_empty());
    }

    #[test]
    fn test_clear_dirty_skips_rows_written_after_snapshot() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_custom_deck("user-1", "Spanish", now()).unwrap();
        let snapshot = repo.dirty_snapshot().unwrap();
        let version = snapshot.decks[0].version.clone();

        let edit = crate::db::DeckEdit {
            name: Some("Spanish II".into()),
            ..Default::default()
        };
        repo.update_deck_details(&deck.id, &edit, now() + Duration::seconds(1))
            .unwrap();

        let cleared = repo
            .clear_dirty(DirtyTable::Decks, &[(deck.id.clone(), version)])
            .unwrap();
        assert_eq!(cleared, 0);
        assert!(repo.get_deck(&deck.id).unwrap().unwrap().is_dirty);
    }

    #[test]
    fn test_apply_remote_skips_tombstoned_and_recounts() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let mut deck = Deck::new_custom("deck-1".into(), "user-1".into(), "Remote".into(), now());
        deck.is_dirty = false;

        let local = repo.create_custom_deck("user-1", "Other", now()).unwrap();
        let doomed = repo
            .create_flashcard(
                &local.id,
                &NewFlashcard {
                    front_text: "x".into(),
                    back_text: "y".into(),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        repo.delete_flashcard(&doomed.id, now()).unwrap();

        let batch = RemoteBatch {
            decks: vec![deck],
            flashcards: vec![
                remote_card("c1", "deck-1", 1),
                remote_card("c2", "deck-1", 2),
                remote_card(&doomed.id, &local.id, 1),
            ],
            ..Default::default()
        };
        let report = repo.apply_remote(&batch, now()).unwrap();

        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped_deleted, 1);
        assert!(repo.get_flashcard(&doomed.id).unwrap().is_none());

        let pulled = repo.get_deck("deck-1").unwrap().unwrap();
        assert_eq!(pulled.flashcard_count, 2);
        assert_eq!(pulled.stats_new, 2);
        let cards: Vec<String> = repo
            .list_flashcards("deck-1")
            .unwrap()
            .into_iter()
            .map(|c| into_record(c).id)
            .collect();
        assert_eq!(cards, vec!["c1", "c2"]);
    }

    #[test]
    fn test_apply_remote_skips_rows_without_local_parent() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let progress = flashcard_core::Progress::new("gone-card", "gone-deck", 2.5, now());

        let batch = RemoteBatch {
            flashcards: vec![remote_card("c1", "gone-deck", 1)],
            progress: vec![progress],
            ..Default::default()
        };
        let report = repo.apply_remote(&batch, now()).unwrap();

        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped_orphaned, 2);
        assert!(repo.get_flashcard("c1").unwrap().is_none());
        assert!(repo.get_deck("gone-deck").unwrap().is_none());
    }
}
