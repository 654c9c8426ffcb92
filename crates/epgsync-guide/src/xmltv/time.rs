//! Packed XMLTV timestamp codec and timezone correction.
//!
//! Feed timestamps are carried as base-100 packed integers
//! (`YYYYMMDDHHMMSS`) so that out-of-range components (hour 24,
//! minute 60, ...) can be carried into a valid calendar date instead
//! of failing the whole programme.

use chrono::{
    Datelike, Duration, FixedOffset, Local, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike,
    Utc,
};

/// Packed timestamp value (`YYYYMMDDHHMMSS`).
pub type PackedTime = i64;

/// Length of the `YYYYMMDDHHMM` prefix.
const MINUTE_PREFIX_LEN: usize = 12;

/// Length of the `YYYYMMDDHHMMSS` prefix.
const SECOND_PREFIX_LEN: usize = 14;

/// Packs a date-time into `YYYYMMDDHHMMSS`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)]
pub fn pack(dt: NaiveDateTime) -> PackedTime {
    [dt.month(), dt.day(), dt.hour(), dt.minute(), dt.second()]
        .into_iter()
        .fold(i64::from(dt.year()), |acc, part| acc * 100 + i64::from(part))
}

/// Unpacks a `YYYYMMDDHHMMSS` value.
///
/// Out-of-range components are carried forward (`20050710245500` becomes
/// `2005-07-11 00:55:00`). Negative values, and values whose year cannot
/// be represented, yield [`NaiveDateTime::MIN`].
#[must_use]
pub fn unpack(packed: PackedTime) -> NaiveDateTime {
    if packed < 0 {
        return NaiveDateTime::MIN;
    }
    let [year, month, day, hour, minute, second] = split(packed);
    compose(year, month, day, hour, minute, second).unwrap_or(NaiveDateTime::MIN)
}

/// Normalizes illegal component values and truncates to the minute.
///
/// Idempotent: correcting an already corrected value returns it unchanged.
#[must_use]
pub fn correct_illegal_date_time(packed: PackedTime) -> PackedTime {
    if packed < 0 {
        return packed;
    }
    let corrected = pack(truncate_to_minute(unpack(packed)));
    let [_, month, day, hour, minute, second] = split(packed);
    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || !(0..24).contains(&hour)
        || !(0..60).contains(&minute)
        || !(0..60).contains(&second)
    {
        tracing::debug!(
            original = packed,
            corrected,
            "feed contains invalid date/time, converted"
        );
    }
    corrected
}

/// Drops seconds and sub-second precision.
#[must_use]
pub fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Parses the leading `YYYYMMDDHHMM[SS]` digits of a feed timestamp.
///
/// Returns `0` when the value is shorter than 12 characters or the
/// digits cannot be parsed. Without seconds the value is scaled so the
/// result is always in `YYYYMMDDHHMMSS` form.
#[must_use]
pub fn parse_timestamp(value: &str) -> PackedTime {
    let bytes = value.as_bytes();
    if bytes.len() < MINUTE_PREFIX_LEN {
        return 0;
    }

    let has_seconds = bytes
        .get(MINUTE_PREFIX_LEN..SECOND_PREFIX_LEN)
        .is_some_and(|s| s.iter().all(u8::is_ascii_digit));

    if has_seconds {
        parse_digits(bytes.get(..SECOND_PREFIX_LEN)).unwrap_or(0)
    } else {
        parse_digits(bytes.get(..MINUTE_PREFIX_LEN)).map_or(0, |v| v.saturating_mul(100))
    }
}

/// Returns the timezone suffix following position 14 (trimmed).
#[must_use]
pub fn timezone_suffix(value: &str) -> &str {
    value.get(SECOND_PREFIX_LEN..).map_or("", str::trim)
}

/// Parses a timezone suffix into a signed `HHMM` decimal (`"+0220"` -> `220`).
///
/// Accepts an optional `GMT` token (`"GMT -0500"`). Anything that does
/// not start with a sign after that token yields `0`.
#[must_use]
pub fn parse_offset(zone: &str) -> i32 {
    let lower = zone.trim().to_lowercase();
    let rest = lower
        .find("gmt")
        .and_then(|pos| lower.get(pos.saturating_add(3)..))
        .unwrap_or(&lower)
        .trim();

    if let Some(digits) = rest.strip_prefix('+') {
        digits.trim().parse::<i32>().unwrap_or(0)
    } else if let Some(digits) = rest.strip_prefix('-') {
        digits.trim().parse::<i32>().map_or(0, i32::saturating_neg)
    } else {
        0
    }
}

/// Zone that corrected reference times are converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// The zone of the running system.
    #[default]
    System,
    /// A fixed offset (mostly for deterministic tests and headless hosts).
    Fixed(FixedOffset),
}

impl LocalZone {
    /// Converts a reference (UTC) time into this zone's wall-clock time.
    #[must_use]
    pub fn from_reference(self, reference: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::System => Local.from_utc_datetime(&reference).naive_local(),
            Self::Fixed(offset) => offset.from_utc_datetime(&reference).naive_local(),
        }
    }

    /// Current calendar date in this zone.
    #[must_use]
    pub fn today(self) -> NaiveDate {
        match self {
            Self::System => Local::now().date_naive(),
            Self::Fixed(offset) => Utc::now().with_timezone(&offset).date_naive(),
        }
    }
}

/// Timezone correction applied to every feed timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCorrection {
    /// Whether the feed's own offset suffix is honoured.
    pub use_time_zone: bool,
    /// Fixed correction added before anything else, in minutes.
    pub fixed_minutes: i64,
    /// Target zone for the final local representation.
    pub local_zone: LocalZone,
}

impl Default for TimeCorrection {
    fn default() -> Self {
        Self {
            use_time_zone: true,
            fixed_minutes: 0,
            local_zone: LocalZone::System,
        }
    }
}

impl TimeCorrection {
    /// Applies the fixed shift, then (if enabled) removes the feed offset
    /// and converts the reference time into the local zone.
    ///
    /// `offset` is the value returned by [`parse_offset`].
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)]
    pub fn apply(&self, time: NaiveDateTime, offset: i32) -> NaiveDateTime {
        let shifted = match Duration::try_minutes(self.fixed_minutes) {
            Some(delta) => shift(time, delta),
            None => {
                tracing::warn!(
                    fixed_minutes = self.fixed_minutes,
                    "fixed time correction out of range, ignored"
                );
                time
            }
        };
        if !self.use_time_zone {
            return shifted;
        }

        // 220 -> 2h 20m, -220 -> -2h -20m
        let hours = offset / 100;
        let minutes = offset - hours * 100;
        let reference = shift(
            shifted,
            -(Duration::hours(i64::from(hours)) + Duration::minutes(i64::from(minutes))),
        );
        self.local_zone.from_reference(reference)
    }
}

/// Adds a duration, leaving the value untouched on overflow.
fn shift(time: NaiveDateTime, delta: Duration) -> NaiveDateTime {
    time.checked_add_signed(delta).unwrap_or(time)
}

/// Splits a packed value into year, month, day, hour, minute, second.
#[allow(clippy::arithmetic_side_effects)]
const fn split(mut packed: PackedTime) -> [i64; 6] {
    let second = packed % 100;
    packed /= 100;
    let minute = packed % 100;
    packed /= 100;
    let hour = packed % 100;
    packed /= 100;
    let day = packed % 100;
    packed /= 100;
    let month = packed % 100;
    packed /= 100;
    [packed, month, day, hour, minute, second]
}

/// Builds a date-time from components that may be out of range.
#[allow(clippy::arithmetic_side_effects)]
fn compose(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
) -> Option<NaiveDateTime> {
    let base = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 1, 1)?;
    let months = month - 1;
    let date = if months >= 0 {
        base.checked_add_months(Months::new(u32::try_from(months).ok()?))?
    } else {
        base.checked_sub_months(Months::new(u32::try_from(-months).ok()?))?
    };

    let offset = Duration::days(day - 1)
        + Duration::hours(hour)
        + Duration::minutes(minute)
        + Duration::seconds(second);
    date.and_hms_opt(0, 0, 0)?.checked_add_signed(offset)
}

/// Parses an all-digit byte slice.
fn parse_digits(digits: Option<&[u8]>) -> Option<i64> {
    let digits = digits?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
