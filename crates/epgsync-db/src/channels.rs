//! Local channel CRUD operations.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// A local channel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChannel {
    /// Channel ID.
    pub id_channel: u32,
    /// Display name.
    pub name: String,
    /// XMLTV channel id the channel is mapped to.
    pub external_id: Option<String>,
}

/// Inserts a channel and returns its new ID.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_channel(conn: &Connection, name: &str, external_id: Option<&str>) -> Result<u32> {
    conn.execute(
        "INSERT INTO channels (name, external_id) VALUES (?1, ?2)",
        rusqlite::params![name, external_id.filter(|id| !id.is_empty())],
    )
    .with_context(|| format!("failed to insert channel {name}"))?;

    u32::try_from(conn.last_insert_rowid()).context("channel id out of range")
}

/// Sets (or clears, with `None`) the XMLTV mapping of a channel.
///
/// Returns `false` if the channel does not exist.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_external_id(conn: &Connection, id_channel: u32, external_id: Option<&str>) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE channels SET external_id = ?2 WHERE id_channel = ?1",
            rusqlite::params![id_channel, external_id.filter(|id| !id.is_empty())],
        )
        .with_context(|| format!("failed to update channel {id_channel}"))?;

    Ok(changed > 0)
}

/// Loads all channels, ordered by ID.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[allow(clippy::module_name_repetitions)]
pub fn load_channels(conn: &Connection) -> Result<Vec<StoredChannel>> {
    query_channels(
        conn,
        "SELECT id_channel, name, external_id FROM channels ORDER BY id_channel",
    )
}

/// Loads channels that have an XMLTV mapping, ordered by external id.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[allow(clippy::module_name_repetitions)]
pub fn load_mapped_channels(conn: &Connection) -> Result<Vec<StoredChannel>> {
    query_channels(
        conn,
        "SELECT id_channel, name, external_id FROM channels
         WHERE external_id IS NOT NULL AND external_id <> ''
         ORDER BY external_id, id_channel",
    )
}

fn query_channels(conn: &Connection, sql: &str) -> Result<Vec<StoredChannel>> {
    let mut stmt = conn
        .prepare(sql)
        .context("failed to prepare channels query")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(StoredChannel {
                id_channel: row.get(0)?,
                name: row.get(1)?,
                external_id: row.get(2)?,
            })
        })
        .context("failed to query channels")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to read channels rows")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::connection::open_db;

    fn setup_db() -> (Connection, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("epgsync.db")).unwrap();
        (conn, dir)
    }

    #[test]
    fn test_insert_and_load_channels() {
        // Arrange
        let (conn, _dir) = setup_db();

        // Act
        let first = insert_channel(&conn, "BBC One", Some("bbc1.uk")).unwrap();
        let second = insert_channel(&conn, "Local", None).unwrap();
        let loaded = load_channels(&conn).unwrap();

        // Assert
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id_channel, first);
        assert_eq!(loaded[0].name, "BBC One");
        assert_eq!(loaded[0].external_id.as_deref(), Some("bbc1.uk"));
        assert_eq!(loaded[1].id_channel, second);
        assert_eq!(loaded[1].external_id, None);
    }

    #[test]
    fn test_load_mapped_channels_ordered_by_external_id() {
        // Arrange
        let (conn, _dir) = setup_db();
        insert_channel(&conn, "Zed", Some("z.example")).unwrap();
        insert_channel(&conn, "Unmapped", None).unwrap();
        insert_channel(&conn, "Empty", Some("")).unwrap();
        insert_channel(&conn, "Alpha", Some("a.example")).unwrap();
        insert_channel(&conn, "Alpha HD", Some("a.example")).unwrap();

        // Act
        let mapped = load_mapped_channels(&conn).unwrap();

        // Assert
        let names: Vec<&str> = mapped.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Alpha HD", "Zed"]);
    }

    #[test]
    fn test_set_external_id() {
        // Arrange
        let (conn, _dir) = setup_db();
        let id = insert_channel(&conn, "Channel", None).unwrap();

        // Act
        let updated = set_external_id(&conn, id, Some("c.example")).unwrap();
        let missing = set_external_id(&conn, 999, Some("x")).unwrap();

        // Assert
        assert!(updated);
        assert!(!missing);
        assert_eq!(
            load_channels(&conn).unwrap()[0].external_id.as_deref(),
            Some("c.example")
        );
    }

    #[test]
    fn test_set_external_id_clears_mapping() {
        // Arrange
        let (conn, _dir) = setup_db();
        let id = insert_channel(&conn, "Channel", Some("c.example")).unwrap();

        // Act
        set_external_id(&conn, id, None).unwrap();

        // Assert
        assert!(load_mapped_channels(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_load_empty_tables() {
        // Arrange
        let (conn, _dir) = setup_db();

        // Act
        let channels = load_channels(&conn).unwrap();

        // Assert
        assert!(channels.is_empty());
    }
}
