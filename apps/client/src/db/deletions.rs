//! Deletion tombstone queue.

use chrono::{DateTime, Utc};
use flashcard_core::{DeletionTombstone, EntityType};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::db::date_utils::{format_timestamp, parse_timestamp};
use crate::db::repository::{DeletionQueue, Result, SqliteRepository};

/// Record a pending remote deletion. Returns `true` if it was not queued yet.
pub(crate) fn enqueue(conn: &Connection, entity_type: EntityType, entity_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO deletion_queue (type, entity_id, created_at) VALUES (?1, ?2, ?3)",
        params![entity_type.as_str(), entity_id, format_timestamp(now)],
    )?;
    Ok(inserted > 0)
}

pub(crate) fn is_pending(conn: &Connection, entity_type: EntityType, entity_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM deletion_queue WHERE type = ?1 AND entity_id = ?2",
            params![entity_type.as_str(), entity_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

impl DeletionQueue for SqliteRepository {
    fn enqueue_deletion(&self, entity_type: EntityType, entity_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let inserted = enqueue(&self.conn, entity_type, entity_id, now)?;
        if inserted {
            debug!(entity_type = entity_type.as_str(), entity_id, "deletion queued");
        }
        Ok(inserted)
    }

    fn list_pending_deletions(&self) -> Result<Vec<DeletionTombstone>> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, entity_id, created_at FROM deletion_queue ORDER BY created_at, id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut pending = Vec::with_capacity(rows.len());
        for (kind, entity_id, created_at) in rows {
            let Some(entity_type) = EntityType::from_str(&kind) else {
                warn!(kind = %kind, entity_id = %entity_id, "skipping tombstone of unknown type");
                continue;
            };
            pending.push(DeletionTombstone {
                entity_type,
                entity_id,
                created_at: parse_timestamp(&created_at).unwrap_or_default(),
            });
        }
        Ok(pending)
    }

    fn clear_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM deletion_queue WHERE type = ?1 AND entity_id = ?2",
            params![entity_type.as_str(), entity_id],
        )?;
        if removed == 0 {
            warn!(entity_type = entity_type.as_str(), entity_id, "no pending tombstone to clear");
        }
        Ok(removed > 0)
    }

    fn has_pending_deletion(&self, entity_type: EntityType, entity_id: &str) -> Result<bool> {
        is_pending(&self.conn, entity_type, entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        assert!(repo.enqueue_deletion(EntityType::Flashcard, "c1", now()).unwrap());
        assert!(!repo.enqueue_deletion(EntityType::Flashcard, "c1", now()).unwrap());
        assert!(repo.enqueue_deletion(EntityType::Deck, "c1", now()).unwrap());
        assert_eq!(repo.list_pending_deletions().unwrap().len(), 2);
    }

    #[test]
    fn test_pending_is_oldest_first() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.enqueue_deletion(EntityType::Deck, "late", now() + Duration::seconds(5)).unwrap();
        repo.enqueue_deletion(EntityType::Flashcard, "early", now()).unwrap();
        repo.enqueue_deletion(EntityType::Flashcard, "tie", now()).unwrap();

        let ids: Vec<String> = repo
            .list_pending_deletions()
            .unwrap()
            .into_iter()
            .map(|t| t.entity_id)
            .collect();
        assert_eq!(ids, vec!["early", "tie", "late"]);
    }

    #[test]
    fn test_clear_missing_tombstone_is_not_an_error() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.enqueue_deletion(EntityType::Deck, "d1", now()).unwrap();
        assert!(repo.clear_deletion(EntityType::Deck, "d1").unwrap());
        assert!(!repo.clear_deletion(EntityType::Deck, "d1").unwrap());
        assert!(!repo.has_pending_deletion(EntityType::Deck, "d1").unwrap());
    }
}
