//! Program CRUD operations.
//!
//! Times are stored as `YYYY-MM-DD HH:MM:SS` text so that string
//! comparison matches chronological order.

use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// A program row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProgram {
    /// Program ID (`None` before insertion).
    pub id_program: Option<u32>,
    /// Channel ID (FK → `channels.id_channel`).
    pub id_channel: u32,
    /// Start time.
    pub start_time: String,
    /// End time.
    pub end_time: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Genre.
    pub genre: String,
    /// Notify flag.
    pub notify: bool,
    /// Season number.
    pub series_num: String,
    /// Episode number.
    pub episode_num: String,
    /// Episode part.
    pub episode_part: String,
    /// Episode name.
    pub episode_name: String,
    /// Star rating (`-1` when unknown).
    pub star_rating: i32,
    /// Parental classification.
    pub classification: String,
    /// Original air date.
    pub original_air_date: String,
    /// Rerun flag.
    pub repeat: bool,
}

/// Inserts programs in one transaction. Returns the number of rows written.
///
/// # Errors
///
/// Returns an error if the database operation fails.
#[allow(clippy::module_name_repetitions)]
pub fn insert_programs(conn: &Connection, programs: &[StoredProgram]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin transaction")?;

    let mut stmt = tx
        .prepare(
            "INSERT INTO programs (
                id_channel, start_time, end_time, title,
                description, genre, notify, series_num,
                episode_num, episode_part, episode_name, star_rating,
                classification, original_air_date, repeat
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .context("failed to prepare programs insert")?;

    let mut inserted: usize = 0;
    for p in programs {
        let rows = stmt
            .execute(rusqlite::params![
                p.id_channel,
                p.start_time,
                p.end_time,
                p.title,
                p.description,
                p.genre,
                p.notify,
                p.series_num,
                p.episode_num,
                p.episode_part,
                p.episode_name,
                p.star_rating,
                p.classification,
                p.original_air_date,
                p.repeat,
            ])
            .with_context(|| {
                format!(
                    "failed to insert program {} at {} on channel {}",
                    p.title, p.start_time, p.id_channel
                )
            })?;
        inserted = inserted.saturating_add(rows);
    }

    drop(stmt);
    tx.commit().context("failed to commit programs insert")?;
    Ok(inserted)
}

/// Inserts programs in transactions of `chunk_size`, pausing `delay`
/// between chunks so concurrent readers are not locked out.
///
/// # Errors
///
/// Returns an error if any chunk fails. Chunks already written stay.
#[allow(clippy::module_name_repetitions)]
pub fn insert_programs_throttled(
    conn: &Connection,
    programs: &[StoredProgram],
    chunk_size: usize,
    delay: Duration,
) -> Result<usize> {
    let mut inserted: usize = 0;
    for (index, chunk) in programs.chunks(chunk_size.max(1)).enumerate() {
        if index > 0 && !delay.is_zero() {
            std::thread::sleep(delay);
        }
        inserted = inserted.saturating_add(insert_programs(conn, chunk)?);
        tracing::trace!(chunk = index, inserted, "program chunk written");
    }
    Ok(inserted)
}

/// Loads the programs of one channel, newest start first.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[allow(clippy::module_name_repetitions)]
pub fn load_programs_for_channel(conn: &Connection, id_channel: u32) -> Result<Vec<StoredProgram>> {
    let mut stmt = conn
        .prepare(
            "SELECT id_program, id_channel, start_time, end_time,
                    title, description, genre, notify,
                    series_num, episode_num, episode_part, episode_name,
                    star_rating, classification, original_air_date, repeat
             FROM programs
             WHERE id_channel = ?1
             ORDER BY start_time DESC",
        )
        .context("failed to prepare programs query")?;

    let rows = stmt
        .query_map([id_channel], map_program_row)
        .context("failed to query programs")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to read programs rows")
}

/// Deletes programs whose end time is before `cutoff`. Returns the count.
///
/// # Errors
///
/// Returns an error if the delete fails.
#[allow(clippy::module_name_repetitions)]
pub fn delete_programs_ended_before(conn: &Connection, cutoff: &str) -> Result<usize> {
    conn.execute("DELETE FROM programs WHERE end_time < ?1", [cutoff])
        .with_context(|| format!("failed to delete programs ended before {cutoff}"))
}

/// Maps a database row to a `StoredProgram`.
fn map_program_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredProgram> {
    Ok(StoredProgram {
        id_program: row.get(0)?,
        id_channel: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        genre: row.get(6)?,
        notify: row.get(7)?,
        series_num: row.get(8)?,
        episode_num: row.get(9)?,
        episode_part: row.get(10)?,
        episode_name: row.get(11)?,
        star_rating: row.get(12)?,
        classification: row.get(13)?,
        original_air_date: row.get(14)?,
        repeat: row.get(15)?,
    })
}
