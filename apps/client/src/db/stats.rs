//! Deck counters and the study queue.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flashcard_core::{CardContent, Deck, Progress, ProgressStatus, StatusCounts};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::db::date_utils::format_timestamp;
use crate::db::decks::load_deck;
use crate::db::flashcards::{list_for_deck, list_for_template};
use crate::db::progress::list_for_deck as list_progress;
use crate::db::repository::{Result, SqliteRepository, StatsRepository, StudyCard};
use crate::db::rows::accept_partial;

/// Count a deck's cards by status. Cards without progress are new.
pub(crate) fn count_statuses(conn: &Connection, deck: &Deck) -> Result<StatusCounts> {
    let (cards_table, source) = match &deck.template_id {
        Some(template_id) => ("template_flashcards", template_id.as_str()),
        None => ("flashcards", deck.id.as_str()),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT p.status FROM {} f
         LEFT JOIN progress p ON p.flashcard_id = f.id AND p.deck_id = ?2
         WHERE f.deck_id = ?1",
        cards_table
    ))?;
    let statuses = stmt
        .query_map(params![source, deck.id], |row| row.get::<_, Option<String>>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(StatusCounts::from_statuses(statuses.into_iter().map(|status| {
        match status.as_deref().map(ProgressStatus::from_str) {
            None => ProgressStatus::New,
            Some(Some(status)) => status,
            Some(None) => {
                warn!(deck_id = %deck.id, "unknown progress status counted as new");
                ProgressStatus::New
            }
        }
    })))
}

/// Write counters and card count, marking the deck dirty only if they moved.
fn write_counts(conn: &Connection, deck_id: &str, counts: StatusCounts, now: DateTime<Utc>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE decks SET stats_new = ?1, stats_learning = ?2, stats_review = ?3,
             stats_mastered = ?4, flashcard_count = ?5, updated_at = ?6, is_dirty = 1
         WHERE id = ?7 AND (stats_new != ?1 OR stats_learning != ?2 OR stats_review != ?3
             OR stats_mastered != ?4 OR flashcard_count != ?5)",
        params![
            counts.new,
            counts.learning,
            counts.review,
            counts.mastered,
            counts.total(),
            format_timestamp(now),
            deck_id,
        ],
    )?;
    Ok(changed > 0)
}

/// Full recount of one deck. `None` if the deck is unknown.
pub(crate) fn recount(conn: &Connection, deck_id: &str, now: DateTime<Utc>) -> Result<Option<StatusCounts>> {
    let Some(deck) = load_deck(conn, deck_id)? else {
        return Ok(None);
    };
    let counts = count_statuses(conn, &deck)?;
    if deck.is_template() && counts.total() == 0 {
        // Template content not cached locally; keep the stored counters.
        debug!(deck_id, "no local template cards, counters kept");
        return Ok(Some(deck.stats()));
    }
    if write_counts(conn, deck_id, counts, now)? {
        debug!(deck_id, ?counts, "deck counters recalculated");
    }
    Ok(Some(counts))
}

/// Move one card between buckets of the stored counters.
pub(crate) fn transition(
    conn: &Connection,
    deck_id: &str,
    from: ProgressStatus,
    to: ProgressStatus,
    now: DateTime<Utc>,
) -> Result<Option<StatusCounts>> {
    let Some(deck) = load_deck(conn, deck_id)? else {
        return Ok(None);
    };
    let mut counts = deck.stats();
    if from == to {
        return Ok(Some(counts));
    }
    counts.apply_transition(from, to);
    conn.execute(
        "UPDATE decks SET stats_new = ?1, stats_learning = ?2, stats_review = ?3,
             stats_mastered = ?4, updated_at = ?5, is_dirty = 1
         WHERE id = ?6",
        params![
            counts.new,
            counts.learning,
            counts.review,
            counts.mastered,
            format_timestamp(now),
            deck_id,
        ],
    )?;
    Ok(Some(counts))
}

/// Queue bucket: due reviews, learning, new, upcoming reviews, mastered.
fn queue_rank(status: ProgressStatus, due: bool) -> u8 {
    match status {
        ProgressStatus::Review if due => 0,
        ProgressStatus::Learning => 1,
        ProgressStatus::New => 2,
        ProgressStatus::Review => 3,
        ProgressStatus::Mastered => 4,
    }
}

pub(crate) fn study_queue(conn: &Connection, deck_id: &str, now: DateTime<Utc>) -> Result<Vec<StudyCard>> {
    let Some(deck) = load_deck(conn, deck_id)? else {
        warn!(deck_id, "study queue requested for unknown deck");
        return Ok(Vec::new());
    };

    let cards: Vec<CardContent> = match &deck.template_id {
        Some(template_id) => list_for_template(conn, template_id)?
            .into_iter()
            .map(|card| CardContent::Template(accept_partial("template_flashcards", card)))
            .collect(),
        None => list_for_deck(conn, &deck.id)?
            .into_iter()
            .map(|card| CardContent::Custom(accept_partial("flashcards", card)))
            .collect(),
    };

    let mut progress: HashMap<String, Progress> = list_progress(conn, &deck.id)?
        .into_iter()
        .map(|p| accept_partial("progress", p))
        .map(|p| (p.flashcard_id.clone(), p))
        .collect();

    let mut queue: Vec<StudyCard> = cards
        .into_iter()
        .map(|card| {
            let progress = progress.remove(card.id());
            let status = progress.as_ref().map_or(ProgressStatus::New, |p| p.status);
            let due = progress.as_ref().map_or(false, |p| p.is_due(now));
            StudyCard {
                card,
                status,
                progress,
                due,
            }
        })
        .collect();

    queue.sort_by_key(|entry| (queue_rank(entry.status, entry.due), entry.card.position()));
    Ok(queue)
}

impl StatsRepository for SqliteRepository {
    fn recalculate_stats(&self, deck_id: &str, now: DateTime<Utc>) -> Result<Option<StatusCounts>> {
        recount(&self.conn, deck_id, now)
    }

    fn apply_stats_transition(
        &self,
        deck_id: &str,
        from: ProgressStatus,
        to: ProgressStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusCounts>> {
        transition(&self.conn, deck_id, from, to, now)
    }

    fn get_deck_stats(&self, deck_id: &str) -> Result<Option<StatusCounts>> {
        Ok(load_deck(&self.conn, deck_id)?.map(|deck| deck.stats()))
    }

    fn get_study_queue(&self, deck_id: &str, now: DateTime<Utc>) -> Result<Vec<StudyCard>> {
        study_queue(&self.conn, deck_id, now)
    }

    fn get_due_count(&self, deck_id: &str, now: DateTime<Utc>) -> Result<u32> {
        let queue = study_queue(&self.conn, deck_id, now)?;
        Ok(queue.iter().filter(|entry| entry.due).count() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DeckRepository, FlashcardRepository, NewFlashcard, ProgressRepository};
    use chrono::{Duration, TimeZone};
    use flashcard_core::{Scheduler, Strategy};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn setup(n: usize) -> (SqliteRepository, String, Vec<String>) {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_custom_deck("user-1", "Spanish", now()).unwrap();
        let ids = (0..n)
            .map(|i| {
                let card = NewFlashcard {
                    front_text: format!("front {}", i),
                    back_text: format!("back {}", i),
                    ..Default::default()
                };
                repo.create_flashcard(&deck.id, &card, now()).unwrap().id
            })
            .collect();
        (repo, deck.id, ids)
    }

    #[test]
    fn test_incremental_and_full_recount_agree() {
        let (repo, deck_id, ids) = setup(4);
        let scheduler = Scheduler::for_strategy(Strategy::Threshold);
        let answers = [(0, true), (0, true), (1, false), (2, true), (0, true), (1, true), (0, false)];

        let mut incremental = StatusCounts::default();
        for (minute, (card, passed)) in answers.iter().enumerate() {
            let at = now() + Duration::minutes(minute as i64);
            let outcome = repo
                .record_answer(&scheduler, &deck_id, &ids[*card], *passed, at)
                .unwrap()
                .unwrap();
            incremental = outcome.stats;
        }

        let full = repo.recalculate_stats(&deck_id, now()).unwrap().unwrap();
        assert_eq!(incremental, full);
        assert_eq!(full.total(), 4);
        assert_eq!(repo.get_deck(&deck_id).unwrap().unwrap().flashcard_count, 4);
    }

    #[test]
    fn test_recount_repairs_drifted_counters() {
        let (repo, deck_id, _) = setup(2);
        repo.connection()
            .execute("UPDATE decks SET stats_new = 7, is_dirty = 0 WHERE id = ?1", params![deck_id])
            .unwrap();

        let counts = repo.recalculate_stats(&deck_id, now()).unwrap().unwrap();
        assert_eq!(counts, StatusCounts::new(2, 0, 0, 0));
        assert!(repo.get_deck(&deck_id).unwrap().unwrap().is_dirty);
    }

    #[test]
    fn test_unchanged_recount_leaves_deck_clean() {
        let (repo, deck_id, _) = setup(2);
        repo.connection()
            .execute("UPDATE decks SET is_dirty = 0 WHERE id = ?1", params![deck_id])
            .unwrap();
        repo.recalculate_stats(&deck_id, now()).unwrap();
        assert!(!repo.get_deck(&deck_id).unwrap().unwrap().is_dirty);
    }

    #[test]
    fn test_study_queue_order() {
        let (repo, deck_id, ids) = setup(4);
        let scheduler = Scheduler::for_strategy(Strategy::Threshold);
        // ids[3]: learning after one pass
        repo.record_answer(&scheduler, &deck_id, &ids[3], true, now()).unwrap();
        // ids[2]: review, due in a day
        repo.record_answer(&scheduler, &deck_id, &ids[2], true, now()).unwrap();
        repo.record_answer(&scheduler, &deck_id, &ids[2], true, now()).unwrap();

        let queue = repo.get_study_queue(&deck_id, now()).unwrap();
        let order: Vec<&str> = queue.iter().map(|entry| entry.card.id()).collect();
        assert_eq!(order, vec![ids[3].as_str(), ids[0].as_str(), ids[1].as_str(), ids[2].as_str()]);
        assert_eq!(repo.get_due_count(&deck_id, now()).unwrap(), 1);

        let later = now() + Duration::days(2);
        let queue = repo.get_study_queue(&deck_id, later).unwrap();
        assert_eq!(queue[0].card.id(), ids[2]);
        assert_eq!(repo.get_due_count(&deck_id, later).unwrap(), 2);
    }

    #[test]
    fn test_unknown_deck_has_no_stats() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        assert_eq!(repo.recalculate_stats("missing", now()).unwrap(), None);
        assert!(repo.get_study_queue("missing", now()).unwrap().is_empty());
    }
}
