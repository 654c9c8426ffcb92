//! Schedule store abstraction used by the importer.

use anyhow::Result;
use chrono::NaiveDateTime;

use crate::xmltv::NormalizedProgram;

/// A channel configured in the local schedule store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChannel {
    /// Local channel id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// XMLTV channel id this channel is mapped to.
    pub external_id: Option<String>,
}

/// A schedule entry bound to a local channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Local channel id.
    pub channel_id: u32,
    /// Start time (local, minute resolution).
    pub start_time: NaiveDateTime,
    /// End time (local, minute resolution).
    pub end_time: NaiveDateTime,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Genre / category.
    pub genre: String,
    /// Whether the user asked to be notified.
    pub notify: bool,
    /// Season number.
    pub series_num: String,
    /// Episode number.
    pub episode_num: String,
    /// Episode part.
    pub episode_part: String,
    /// Episode name.
    pub episode_name: String,
    /// Star rating 0..=10, `-1` when unknown.
    pub star_rating: i32,
    /// Parental classification.
    pub classification: String,
    /// Original air date text.
    pub original_air_date: String,
    /// Rerun flag.
    pub repeat: bool,
    /// Whether the end time came from the feed.
    pub has_explicit_stop: bool,
}

impl Program {
    /// Binds a normalized programme to a local channel.
    #[must_use]
    pub fn from_normalized(channel_id: u32, program: &NormalizedProgram) -> Self {
        Self {
            channel_id,
            start_time: program.start,
            end_time: program.end,
            title: program.title.clone(),
            description: program.description.clone(),
            genre: program.category.clone(),
            notify: false,
            series_num: program.episode.series.clone(),
            episode_num: program.episode.episode.clone(),
            episode_part: program.episode.part.clone(),
            episode_name: program.episode_name.clone(),
            star_rating: program.star_rating,
            classification: program.classification.clone(),
            original_air_date: program.original_air_date.clone(),
            repeat: program.repeat,
            has_explicit_stop: program.has_explicit_stop,
        }
    }

    /// Returns `true` if this program occupies any part of `[start, end)`.
    ///
    /// A zero-length range overlaps when its instant falls inside.
    #[must_use]
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        if start == end {
            return self.start_time <= start && start < self.end_time;
        }
        self.start_time < end && start < self.end_time
    }
}

/// How aggressively programs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPriority {
    /// Write everything in one go.
    Normal,
    /// Write in small chunks with pauses so other readers are not starved.
    #[default]
    Background,
}

/// Persistent storage behind an import.
pub trait GuideStore {
    /// All local channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_local_channels(&self) -> Result<Vec<LocalChannel>>;

    /// Channels with an external id, ordered by external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_mapped_channels(&self) -> Result<Vec<LocalChannel>>;

    /// Reads a setting, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_setting(&self, key: &str, default: &str) -> Result<String>;

    /// Deletes programs that ended before today; returns the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn purge_old_programs(&self) -> Result<usize>;

    /// Programs of one channel, newest start first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_programs(&self, channel_id: u32) -> Result<Vec<Program>>;

    /// Inserts programs; returns the number written.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    fn bulk_insert_programs(&self, programs: &[Program], priority: InsertPriority)
    -> Result<usize>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn program(start: NaiveDateTime, end: NaiveDateTime) -> Program {
        Program {
            channel_id: 1,
            start_time: start,
            end_time: end,
            title: String::new(),
            description: String::new(),
            genre: String::new(),
            notify: false,
            series_num: String::new(),
            episode_num: String::new(),
            episode_part: String::new(),
            episode_name: String::new(),
            star_rating: -1,
            classification: String::new(),
            original_air_date: String::new(),
            repeat: false,
            has_explicit_stop: true,
        }
    }

    #[test]
    fn test_overlaps_partial() {
        // Arrange
        let existing = program(at(20, 30), at(21, 30));

        // Act & Assert
        assert!(existing.overlaps(at(20, 0), at(21, 0)));
        assert!(existing.overlaps(at(21, 0), at(22, 0)));
    }

    #[test]
    fn test_overlaps_adjacent_is_free() {
        // Arrange
        let existing = program(at(20, 0), at(21, 0));

        // Act & Assert
        assert!(!existing.overlaps(at(21, 0), at(22, 0)));
        assert!(!existing.overlaps(at(19, 0), at(20, 0)));
    }

    #[test]
    fn test_overlaps_zero_length() {
        // Arrange
        let existing = program(at(20, 0), at(21, 0));

        // Act & Assert
        assert!(existing.overlaps(at(20, 0), at(20, 0)));
        assert!(existing.overlaps(at(20, 30), at(20, 30)));
        assert!(!existing.overlaps(at(21, 0), at(21, 0)));
    }
}
