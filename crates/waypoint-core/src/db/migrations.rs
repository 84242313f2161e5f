//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    debug_assert_eq!(get_version(conn)?, CURRENT_VERSION);
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: records, tombstones and pull cursors
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- One row per local record; payload is the full local JSON
        CREATE TABLE IF NOT EXISTS records (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (sync_status IN ('synced', 'pending', 'failed')),
            local_version INTEGER NOT NULL DEFAULT 1,
            last_error TEXT,
            PRIMARY KEY (kind, id)
        );
        CREATE INDEX IF NOT EXISTS idx_records_status ON records(sync_status);
        CREATE INDEX IF NOT EXISTS idx_records_kind_updated ON records(kind, updated_at);

        -- Local deletions awaiting remote confirmation
        CREATE TABLE IF NOT EXISTS pending_deletions (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            deleted_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (sync_status IN ('pending', 'failed')),
            last_error TEXT,
            PRIMARY KEY (kind, id)
        );

        CREATE TABLE IF NOT EXISTS sync_cursors (
            kind TEXT PRIMARY KEY,
            cursor INTEGER NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;
    Ok(())
}

/// Migration to version 2: persisted sync metadata (last successful sync)
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pending_deletions_status ON pending_deletions(sync_status);
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;
    Ok(())
}
