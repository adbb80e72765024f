//! SQLite schema definitions.

/// Current schema version, one per migration step.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Tables in their current shape. Existing tables are left untouched and
/// brought up to date by [`MIGRATIONS`].
pub const SCHEMA: &str = r#"
-- Decks owned by the user (custom or adopted from a template)
CREATE TABLE IF NOT EXISTS decks (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    template_id TEXT,
    is_custom INTEGER NOT NULL DEFAULT 1,
    name TEXT NOT NULL DEFAULT '',
    description TEXT,
    language TEXT,
    cover_image TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    difficulty TEXT,
    flashcard_count INTEGER NOT NULL DEFAULT 0,
    stats_new INTEGER NOT NULL DEFAULT 0,
    stats_learning INTEGER NOT NULL DEFAULT 0,
    stats_review INTEGER NOT NULL DEFAULT 0,
    stats_mastered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_dirty INTEGER NOT NULL DEFAULT 0
);

-- Metadata for user-authored decks
CREATE TABLE IF NOT EXISTS custom_deck_metadata (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    description TEXT,
    language TEXT,
    cover_image TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_dirty INTEGER NOT NULL DEFAULT 0
);

-- User-authored flashcards
CREATE TABLE IF NOT EXISTS flashcards (
    id TEXT PRIMARY KEY,
    deck_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    front_text TEXT NOT NULL,
    back_text TEXT NOT NULL,
    hint TEXT,
    front_image TEXT,
    back_image TEXT,
    front_audio TEXT,
    back_audio TEXT,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_dirty INTEGER NOT NULL DEFAULT 0
);

-- Read-only flashcards of shared template decks
CREATE TABLE IF NOT EXISTS template_flashcards (
    id TEXT PRIMARY KEY,
    deck_id TEXT NOT NULL,
    front_text TEXT NOT NULL,
    back_text TEXT NOT NULL,
    front_image TEXT,
    back_image TEXT,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Study progress, one row per answered flashcard
CREATE TABLE IF NOT EXISTS progress (
    flashcard_id TEXT PRIMARY KEY,
    deck_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'new',
    correct_count INTEGER NOT NULL DEFAULT 0,
    incorrect_count INTEGER NOT NULL DEFAULT 0,
    repetition INTEGER NOT NULL DEFAULT 0,
    easiness_factor REAL NOT NULL DEFAULT 2.5,
    interval_days REAL NOT NULL DEFAULT 0,
    next_review_at TEXT,
    last_reviewed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_dirty INTEGER NOT NULL DEFAULT 0
);

-- Local deletions awaiting remote confirmation
CREATE TABLE IF NOT EXISTS deletion_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(type, entity_id)
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);
"#;

/// Indexes, created once migrations have settled the column names.
pub const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_decks_user ON decks(user_id);
CREATE INDEX IF NOT EXISTS idx_decks_dirty ON decks(is_dirty);
CREATE INDEX IF NOT EXISTS idx_flashcards_deck_position ON flashcards(deck_id, position);
CREATE INDEX IF NOT EXISTS idx_flashcards_dirty ON flashcards(is_dirty);
CREATE INDEX IF NOT EXISTS idx_template_flashcards_deck ON template_flashcards(deck_id, position);
CREATE INDEX IF NOT EXISTS idx_progress_deck ON progress(deck_id);
CREATE INDEX IF NOT EXISTS idx_progress_dirty ON progress(is_dirty);
CREATE INDEX IF NOT EXISTS idx_deletion_queue_created ON deletion_queue(created_at);
"#;

/// One additive schema change.
#[derive(Debug, Clone, Copy)]
pub enum Migration {
    /// Add a column unless it already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
    /// Rename a column if the old name is present and the new one is not.
    RenameColumn {
        table: &'static str,
        from: &'static str,
        to: &'static str,
    },
    /// Idempotent data fix, run when all `requires` columns exist.
    Backfill {
        table: &'static str,
        requires: &'static [&'static str],
        sql: &'static str,
    },
}

/// Ordered migrations from the earliest released layout.
pub const MIGRATIONS: &[Migration] = &[
    Migration::AddColumn {
        table: "decks",
        column: "template_id",
        definition: "TEXT",
    },
    Migration::AddColumn {
        table: "decks",
        column: "is_custom",
        definition: "INTEGER NOT NULL DEFAULT 1",
    },
    Migration::Backfill {
        table: "decks",
        requires: &["template_id", "is_custom"],
        sql: "UPDATE decks SET is_custom = 0 WHERE template_id IS NOT NULL AND is_custom != 0",
    },
    Migration::AddColumn {
        table: "decks",
        column: "stats_new",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    Migration::AddColumn {
        table: "decks",
        column: "stats_learning",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    Migration::AddColumn {
        table: "decks",
        column: "stats_review",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    Migration::AddColumn {
        table: "decks",
        column: "stats_mastered",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    // Rows from before dirty tracking were never confirmed remotely.
    Migration::AddColumn {
        table: "decks",
        column: "is_dirty",
        definition: "INTEGER NOT NULL DEFAULT 1",
    },
    Migration::AddColumn {
        table: "flashcards",
        column: "is_dirty",
        definition: "INTEGER NOT NULL DEFAULT 1",
    },
    Migration::AddColumn {
        table: "progress",
        column: "is_dirty",
        definition: "INTEGER NOT NULL DEFAULT 1",
    },
    Migration::RenameColumn {
        table: "flashcards",
        from: "front",
        to: "front_text",
    },
    Migration::RenameColumn {
        table: "flashcards",
        from: "back",
        to: "back_text",
    },
    Migration::AddColumn {
        table: "flashcards",
        column: "hint",
        definition: "TEXT",
    },
    Migration::AddColumn {
        table: "flashcards",
        column: "front_audio",
        definition: "TEXT",
    },
    Migration::AddColumn {
        table: "flashcards",
        column: "back_audio",
        definition: "TEXT",
    },
    Migration::RenameColumn {
        table: "progress",
        from: "ease_factor",
        to: "easiness_factor",
    },
    Migration::AddColumn {
        table: "progress",
        column: "repetition",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    Migration::Backfill {
        table: "progress",
        requires: &["easiness_factor"],
        sql: "UPDATE progress SET easiness_factor = 2.5 WHERE easiness_factor IS NULL OR easiness_factor < 1.3",
    },
    Migration::Backfill {
        table: "decks",
        requires: &["tags"],
        sql: "UPDATE decks SET tags = '[]' WHERE tags IS NULL OR tags = ''",
    },
];
