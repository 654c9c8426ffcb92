//! Key/value settings.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// Reads a setting.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
    .with_context(|| format!("failed to read setting {key}"))
}

/// Writes a setting, replacing any previous value.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )
    .with_context(|| format!("failed to write setting {key}"))?;
    Ok(())
}

/// Loads all settings, ordered by key.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn load_settings(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM settings ORDER BY key")
        .context("failed to prepare settings query")?;

    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .context("failed to query settings")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to read settings rows")
}
