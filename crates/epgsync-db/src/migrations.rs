//! Schema version management using `PRAGMA user_version`.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version.
const CURRENT_VERSION: u32 = 2;

/// Runs database migrations up to `CURRENT_VERSION`.
///
/// # Errors
///
/// Returns an error if any SQL statement fails.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version")?;

    if version < 1 {
        migrate_v1(conn).context("migration to v1 failed")?;
    }
    if version < 2 {
        migrate_v2(conn).context("migration to v2 failed")?;
    }

    if version < CURRENT_VERSION {
        tracing::info!(from = version, to = CURRENT_VERSION, "database schema migrated");
    }
    conn.pragma_update(None, "user_version", CURRENT_VERSION)
        .context("failed to update user_version")?;

    Ok(())
}

/// Migration to v1: create `channels` and `settings` tables.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channels (
            id_channel   INTEGER PRIMARY KEY,
            name         TEXT NOT NULL,
            external_id  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_channels_external_id ON channels(external_id);

        CREATE TABLE IF NOT EXISTS settings (
            key    TEXT PRIMARY KEY,
            value  TEXT NOT NULL
        );",
    )
    .context("failed to create channels/settings tables")?;

    Ok(())
}

/// Migration to v2: create the `programs` table.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS programs (
            id_program         INTEGER PRIMARY KEY,
            id_channel         INTEGER NOT NULL REFERENCES channels(id_channel),
            start_time         TEXT NOT NULL,
            end_time           TEXT NOT NULL,
            title              TEXT NOT NULL,
            description        TEXT NOT NULL DEFAULT '',
            genre              TEXT NOT NULL DEFAULT '-',
            notify             INTEGER NOT NULL DEFAULT 0,
            series_num         TEXT NOT NULL DEFAULT '',
            episode_num        TEXT NOT NULL DEFAULT '',
            episode_part       TEXT NOT NULL DEFAULT '',
            episode_name       TEXT NOT NULL DEFAULT '',
            star_rating        INTEGER NOT NULL DEFAULT -1,
            classification     TEXT NOT NULL DEFAULT '',
            original_air_date  TEXT NOT NULL DEFAULT '',
            repeat             INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_programs_channel_start ON programs(id_channel, start_time);
        CREATE INDEX IF NOT EXISTS idx_programs_end_time ON programs(end_time);",
    )
    .context("failed to create programs table")?;

    Ok(())
}
