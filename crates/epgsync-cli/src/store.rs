//! [`GuideStore`] backed by the `SQLite` schedule database.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, NaiveTime};
use epgsync_db::{
    StoredChannel, StoredProgram, delete_programs_ended_before, get_setting, insert_programs,
    insert_programs_throttled, load_channels, load_mapped_channels, load_programs_for_channel,
};
use epgsync_guide::import::{GuideStore, InsertPriority, LocalChannel, Program};
use rusqlite::Connection;

/// Text layout of program times in the database.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Schedule store over an open database connection.
#[derive(Debug)]
pub struct SqliteGuideStore {
    conn: Connection,
    chunk_size: usize,
    delay: Duration,
}

impl SqliteGuideStore {
    /// Wraps a migrated connection.
    pub const fn new(conn: Connection) -> Self {
        Self {
            conn,
            chunk_size: 50,
            delay: Duration::ZERO,
        }
    }

    /// Sets the chunk size and pause used for background inserts.
    #[must_use]
    pub const fn with_throttle(mut self, chunk_size: usize, delay: Duration) -> Self {
        self.chunk_size = chunk_size;
        self.delay = delay;
        self
    }
}

impl GuideStore for SqliteGuideStore {
    fn list_local_channels(&self) -> Result<Vec<LocalChannel>> {
        Ok(load_channels(&self.conn)?
            .into_iter()
            .map(to_local_channel)
            .collect())
    }

    fn list_mapped_channels(&self) -> Result<Vec<LocalChannel>> {
        Ok(load_mapped_channels(&self.conn)?
            .into_iter()
            .map(to_local_channel)
            .collect())
    }

    fn get_setting(&self, key: &str, default: &str) -> Result<String> {
        Ok(get_setting(&self.conn, key)?.unwrap_or_else(|| String::from(default)))
    }

    fn purge_old_programs(&self) -> Result<usize> {
        let cutoff = Local::now().date_naive().and_time(NaiveTime::MIN);
        let deleted =
            delete_programs_ended_before(&self.conn, &cutoff.format(TIME_FORMAT).to_string())?;
        tracing::debug!(deleted, cutoff = %cutoff, "purged programs");
        Ok(deleted)
    }

    fn list_programs(&self, channel_id: u32) -> Result<Vec<Program>> {
        load_programs_for_channel(&self.conn, channel_id)?
            .iter()
            .map(from_stored)
            .collect()
    }

    fn bulk_insert_programs(
        &self,
        programs: &[Program],
        priority: InsertPriority,
    ) -> Result<usize> {
        let rows: Vec<StoredProgram> = programs.iter().map(to_stored).collect();
        match priority {
            InsertPriority::Normal => insert_programs(&self.conn, &rows),
            InsertPriority::Background => {
                insert_programs_throttled(&self.conn, &rows, self.chunk_size, self.delay)
            }
        }
    }
}

fn to_local_channel(channel: StoredChannel) -> LocalChannel {
    LocalChannel {
        id: channel.id_channel,
        name: channel.name,
        external_id: channel.external_id,
    }
}

fn to_stored(program: &Program) -> StoredProgram {
    StoredProgram {
        id_program: None,
        id_channel: program.channel_id,
        start_time: program.start_time.format(TIME_FORMAT).to_string(),
        end_time: program.end_time.format(TIME_FORMAT).to_string(),
        title: program.title.clone(),
        description: program.description.clone(),
        genre: program.genre.clone(),
        notify: program.notify,
        series_num: program.series_num.clone(),
        episode_num: program.episode_num.clone(),
        episode_part: program.episode_part.clone(),
        episode_name: program.episode_name.clone(),
        star_rating: program.star_rating,
        classification: program.classification.clone(),
        original_air_date: program.original_air_date.clone(),
        repeat: program.repeat,
    }
}

/// Converts a stored row back into a [`Program`].
///
/// # Errors
///
/// Returns an error if a stored time is not in [`TIME_FORMAT`].
fn from_stored(row: &StoredProgram) -> Result<Program> {
    let parse = |value: &str| {
        NaiveDateTime::parse_from_str(value, TIME_FORMAT)
            .with_context(|| format!("invalid stored time {value:?} for {}", row.title))
    };
    Ok(Program {
        channel_id: row.id_channel,
        start_time: parse(&row.start_time)?,
        end_time: parse(&row.end_time)?,
        title: row.title.clone(),
        description: row.description.clone(),
        genre: row.genre.clone(),
        notify: row.notify,
        series_num: row.series_num.clone(),
        episode_num: row.episode_num.clone(),
        episode_part: row.episode_part.clone(),
        episode_name: row.episode_name.clone(),
        star_rating: row.star_rating,
        classification: row.classification.clone(),
        original_air_date: row.original_air_date.clone(),
        repeat: row.repeat,
        has_explicit_stop: true,
    })
}
