//! Import progress statistics.

use chrono::NaiveDateTime;

/// Progress of the current or last import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Human readable phase or result.
    pub status: String,
    /// Feed channels mapped to at least one local channel.
    pub channels: usize,
    /// Programs collected or processed in the current phase.
    pub programs: usize,
    /// Earliest program start seen while storing.
    pub start_time: Option<NaiveDateTime>,
    /// Latest program end seen while storing.
    pub end_time: Option<NaiveDateTime>,
}

impl ImportStats {
    /// Sets the status line.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Widens the covered time range to include `[start, end]`.
    pub fn observe(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        self.start_time = Some(self.start_time.map_or(start, |s| s.min(start)));
        self.end_time = Some(self.end_time.map_or(end, |e| e.max(end)));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_observe_widens_range() {
        // Arrange
        let mut stats = ImportStats::default();

        // Act
        stats.observe(at(20), at(21));
        stats.observe(at(18), at(19));
        stats.observe(at(21), at(23));

        // Assert
        assert_eq!(stats.start_time, Some(at(18)));
        assert_eq!(stats.end_time, Some(at(23)));
    }
}
