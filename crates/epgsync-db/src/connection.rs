//! Opening the guide database.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::migrations::run_migrations;

/// How long a statement waits for a lock held by a concurrent import.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the guide database at `path` and runs migrations.
///
/// Missing parent directories are created. File databases use WAL so
/// listings keep working while a background import is writing.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created, or
/// migrations fail.
pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    let journal: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("failed to enable WAL journal")?;

    run_migrations(&conn).context("database migration failed")?;
    tracing::debug!(path = %path.display(), journal, "guide database opened");

    Ok(conn)
}

/// Opens a migrated in-memory database.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    run_migrations(&conn).context("database migration failed")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_open_db_creates_parent_dirs() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("guide.db");

        // Act
        let conn = open_db(&path).unwrap();

        // Assert
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert!(version > 0);
        assert!(path.exists());
    }

    #[test]
    fn test_open_db_uses_wal_journal() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.db");

        // Act
        let conn = open_db(&path).unwrap();

        // Assert
        let journal: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopen_keeps_rows() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.db");
        {
            let conn = open_db(&path).unwrap();
            conn.execute(
                "INSERT INTO settings (key, value) VALUES ('xmlTvTimeZoneHours', '1')",
                [],
            )
            .unwrap();
        }

        // Act
        let conn = open_db(&path).unwrap();

        // Assert
        let value: String = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'xmlTvTimeZoneHours'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "1");
    }

    #[test]
    fn test_open_in_memory_is_migrated() {
        // Arrange & Act
        let conn = open_in_memory().unwrap();

        // Assert
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM programs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
