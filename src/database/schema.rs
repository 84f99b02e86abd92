/*!
 * Table layout of the review store.
 *
 * The layout version lives in SQLite's `user_version` pragma. A fresh file
 * (version 0) gets every table; a file written by a newer build is refused.
 */

use anyhow::{Result, bail};
use log::{debug, info};
use rusqlite::Connection;

/// Layout version written by this build
pub const SCHEMA_VERSION: i32 = 1;

const TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS upload_batches (
    id TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    total_records INTEGER NOT NULL,
    stored_records INTEGER NOT NULL,
    skipped_existing INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS translation_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sentence_id TEXT NOT NULL UNIQUE,
    original_text TEXT NOT NULL,
    human_translated_text TEXT,
    ai_translation TEXT,
    final_status TEXT NOT NULL,
    attempts TEXT NOT NULL,
    source_type TEXT NOT NULL DEFAULT 'csv_upload',
    upload_batch_id TEXT NOT NULL REFERENCES upload_batches(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_batch ON translation_tasks(upload_batch_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON translation_tasks(status);
"#;

/// Create the tables on a fresh database and enable foreign keys
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;

    match schema_version(conn)? {
        0 => {
            info!("Creating review database tables (v{})", SCHEMA_VERSION);
            // In-memory databases silently keep their own journal mode
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            conn.execute_batch(TABLES)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        SCHEMA_VERSION => debug!("Review database is at v{}", SCHEMA_VERSION),
        other => bail!(
            "Review database has layout v{} but this build only knows v{}",
            other,
            SCHEMA_VERSION
        ),
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
