use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS apiaries (
    rowid INTEGER PRIMARY KEY,
    apiary_id BLOB NOT NULL UNIQUE CHECK (length(apiary_id) = 16),
    name TEXT NOT NULL,
    location TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hives (
    rowid INTEGER PRIMARY KEY,
    hive_id BLOB NOT NULL UNIQUE CHECK (length(hive_id) = 16),
    apiary_id BLOB NOT NULL REFERENCES apiaries (apiary_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    start_year INTEGER NOT NULL,
    start_month INTEGER NOT NULL CHECK (start_month BETWEEN 1 AND 12)
);
CREATE INDEX IF NOT EXISTS idx_hives_apiary ON hives (apiary_id);

CREATE TABLE IF NOT EXISTS mite_reports (
    rowid INTEGER PRIMARY KEY,
    report_id BLOB NOT NULL UNIQUE CHECK (length(report_id) = 16),
    hive_id BLOB NOT NULL REFERENCES hives (hive_id) ON DELETE CASCADE,
    year INTEGER NOT NULL,
    week INTEGER NOT NULL CHECK (week BETWEEN 1 AND 53),
    mite_count INTEGER NOT NULL CHECK (mite_count >= 0),
    updated_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    UNIQUE (hive_id, year, week)
);
";
