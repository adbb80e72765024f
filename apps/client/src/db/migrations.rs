//! Schema creation and introspection-guarded migrations.

use std::collections::HashSet;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::db::error::DbError;
use crate::db::schema::{Migration, INDEXES, MIGRATIONS, SCHEMA, SCHEMA_VERSION};

type Result<T> = std::result::Result<T, DbError>;

/// Bring a database to the current schema. Safe to run repeatedly.
pub fn initialize(conn: &Connection) -> Result<()> {
    check_integrity(conn)?;
    conn.execute_batch(SCHEMA)?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        if apply(conn, migration)? {
            applied += 1;
        }
    }
    conn.execute_batch(INDEXES)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;

    if applied > 0 {
        info!(applied, version = SCHEMA_VERSION, "schema migrated");
    }
    Ok(())
}

/// Highest recorded schema version.
pub fn current_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn check_integrity(conn: &Connection) -> Result<()> {
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| DbError::Corrupt(e.to_string()))?;
    if verdict != "ok" {
        return Err(DbError::Corrupt(verdict));
    }
    Ok(())
}

/// Column names of a table, empty if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(columns)
}

/// Apply one migration, returning whether it changed anything.
fn apply(conn: &Connection, migration: &Migration) -> Result<bool> {
    match *migration {
        Migration::AddColumn {
            table,
            column,
            definition,
        } => {
            if table_columns(conn, table)?.contains(column) {
                return Ok(false);
            }
            debug!(table, column, "adding column");
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table, column, definition
            ))?;
            Ok(true)
        }
        Migration::RenameColumn { table, from, to } => {
            let columns = table_columns(conn, table)?;
            if !columns.contains(from) || columns.contains(to) {
                return Ok(false);
            }
            debug!(table, from, to, "renaming column");
            conn.execute_batch(&format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table, from, to
            ))?;
            Ok(true)
        }
        Migration::Backfill {
            table,
            requires,
            sql,
        } => {
            let columns = table_columns(conn, table)?;
            if !requires.iter().all(|c| columns.contains(*c)) {
                return Ok(false);
            }
            let changed = conn.execute(sql, [])?;
            Ok(changed > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_SCHEMA: &str = r#"
        CREATE TABLE decks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            description TEXT,
            language TEXT,
            cover_image TEXT,
            tags TEXT,
            difficulty TEXT,
            flashcard_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE flashcards (
            id TEXT PRIMARY KEY,
            deck_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            front TEXT NOT NULL,
            back TEXT NOT NULL,
            front_image TEXT,
            back_image TEXT,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE progress (
            flashcard_id TEXT PRIMARY KEY,
            deck_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'new',
            correct_count INTEGER NOT NULL DEFAULT 0,
            incorrect_count INTEGER NOT NULL DEFAULT 0,
            ease_factor REAL,
            interval_days REAL NOT NULL DEFAULT 0,
            next_review_at TEXT,
            last_reviewed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        INSERT INTO decks (id, user_id, name, tags, created_at, updated_at)
            VALUES ('d1', 'u1', 'Legacy', NULL, '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z');
        INSERT INTO flashcards (id, deck_id, user_id, front, back, position, created_at, updated_at)
            VALUES ('c1', 'd1', 'u1', 'perro', 'dog', 1, '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z');
        INSERT INTO progress (flashcard_id, deck_id, status, ease_factor, created_at, updated_at)
            VALUES ('c1', 'd1', 'learning', NULL, '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z');
    "#;

    #[test]
    fn fresh_database_gets_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(table_columns(&conn, "progress").unwrap().contains("easiness_factor"));
    }

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn legacy_layout_is_upgraded_without_data_loss() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_SCHEMA).unwrap();

        initialize(&conn).unwrap();

        let flashcard_columns = table_columns(&conn, "flashcards").unwrap();
        assert!(flashcard_columns.contains("front_text"));
        assert!(!flashcard_columns.contains("front"));
        assert!(flashcard_columns.contains("front_audio"));

        let (front, back, dirty): (String, String, i64) = conn
            .query_row(
                "SELECT front_text, back_text, is_dirty FROM flashcards WHERE id = 'c1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((front.as_str(), back.as_str(), dirty), ("perro", "dog", 1));

        let (ease, repetition): (f64, i64) = conn
            .query_row(
                "SELECT easiness_factor, repetition FROM progress WHERE flashcard_id = 'c1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(ease, 2.5);
        assert_eq!(repetition, 0);

        let (is_custom, tags, stats_new): (i64, String, i64) = conn
            .query_row(
                "SELECT is_custom, tags, stats_new FROM decks WHERE id = 'd1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((is_custom, tags.as_str(), stats_new), (1, "[]", 0));
    }

    #[test]
    fn rename_is_skipped_once_applied() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let rename = Migration::RenameColumn {
            table: "progress",
            from: "ease_factor",
            to: "easiness_factor",
        };
        assert!(!apply(&conn, &rename).unwrap());
    }
}
