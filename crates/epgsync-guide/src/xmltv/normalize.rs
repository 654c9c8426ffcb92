//! Conversion of raw `<programme>` data into validated schedule entries.

use chrono::NaiveDateTime;

use super::entities::decode_text;
use super::time::{
    TimeCorrection, correct_illegal_date_time, parse_offset, parse_timestamp, timezone_suffix,
    truncate_to_minute, unpack,
};
use super::types::RawProgram;

/// Category used when the feed provides none.
pub const DEFAULT_CATEGORY: &str = "-";

/// Rating value meaning "no usable star rating".
pub const NO_STAR_RATING: i32 = -1;

/// A programme with decoded text and local times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedProgram {
    /// Feed channel id (`channel` attribute).
    pub feed_channel: String,
    /// Local start time, minute resolution.
    pub start: NaiveDateTime,
    /// Local end time; equals `start` when the feed gave no usable stop.
    pub end: NaiveDateTime,
    /// Whether `end` came from the feed.
    pub has_explicit_stop: bool,
    /// Title.
    pub title: String,
    /// Description (may be empty).
    pub description: String,
    /// Category, `"-"` when absent.
    pub category: String,
    /// Episode name from `<sub-title>`.
    pub episode_name: String,
    /// Season/episode/part parsed from an `xmltv_ns` episode number.
    pub episode: EpisodeNumbering,
    /// `<date>` text.
    pub original_air_date: String,
    /// `<previously-shown>` was present.
    pub repeat: bool,
    /// Star rating 0..=10, or [`NO_STAR_RATING`].
    pub star_rating: i32,
    /// Raw rating markup.
    pub classification: String,
}

/// Season, episode and part numbers as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeNumbering {
    /// Season number.
    pub series: String,
    /// Episode number.
    pub episode: String,
    /// Part in `n/t` form, or empty.
    pub part: String,
}

impl EpisodeNumbering {
    /// Parses an `xmltv_ns` value such as `"0 . 5 . 0/2"`.
    ///
    /// The numbers are kept as the feed wrote them. Only a `d/d` part is
    /// renormalized: a total of one clears it, a zero index becomes `1`.
    #[must_use]
    pub fn parse_xmltv_ns(raw: &str) -> Self {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = decode_text(&compact);

        let Some((series, rest)) = compact.split_once('.') else {
            return Self {
                series: compact,
                ..Self::default()
            };
        };
        let (episode, part) = rest.split_once('.').unwrap_or((rest, ""));

        Self {
            series: series.to_owned(),
            episode: episode.to_owned(),
            part: renormalize_part(part),
        }
    }
}

fn renormalize_part(part: &str) -> String {
    match part.as_bytes() {
        [index, b'/', total] if index.is_ascii_digit() && total.is_ascii_digit() => {
            if *total == b'1' {
                String::new()
            } else if *index == b'0' {
                format!("1/{}", char::from(*total))
            } else {
                part.to_owned()
            }
        }
        _ => part.to_owned(),
    }
}

/// Parses star-rating content such as `"5.2/10"` or `"<value>7/10</value>"`.
///
/// The numerator is rounded half-to-even. Anything unusable, including
/// values outside `0..=10`, yields [`NO_STAR_RATING`].
#[must_use]
#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
pub fn parse_star_rating(raw: &str) -> i32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return NO_STAR_RATING;
    }

    let value = if trimmed.starts_with('<') {
        inner_text(trimmed).unwrap_or("")
    } else {
        trimmed
    };

    let Some((numerator, _)) = value.split_once('/') else {
        tracing::info!(star_rating = raw, "star-rating could not be used");
        return NO_STAR_RATING;
    };

    match numerator.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => {
            let rounded = n.round_ties_even();
            if (0.0..=10.0).contains(&rounded) {
                rounded as i32
            } else {
                tracing::info!(star_rating = raw, "star-rating out of range");
                NO_STAR_RATING
            }
        }
        _ => {
            tracing::info!(star_rating = raw, "star-rating could not be used");
            NO_STAR_RATING
        }
    }
}

/// Text between the first tag and the next closing tag.
fn inner_text(markup: &str) -> Option<&str> {
    let open_end = markup.find('>')?.saturating_add(1);
    let rest = markup.get(open_end..)?;
    let close = rest.find("</")?;
    rest.get(..close)
}

/// Turns [`RawProgram`]s into [`NormalizedProgram`]s.
#[derive(Debug, Clone, Copy)]
pub struct ProgramNormalizer {
    correction: TimeCorrection,
}

impl ProgramNormalizer {
    /// Creates a normalizer applying `correction` to every timestamp.
    #[must_use]
    pub const fn new(correction: TimeCorrection) -> Self {
        Self { correction }
    }

    /// Validates and decodes one programme.
    ///
    /// Returns `None` (logged) when the start, channel or title is
    /// missing, or the start cannot be parsed. An unusable stop is
    /// treated as absent.
    #[must_use]
    pub fn normalize(&self, raw: &RawProgram) -> Option<NormalizedProgram> {
        let (Some(start_raw), Some(channel), Some(title)) = (
            non_empty(raw.start.as_deref()),
            non_empty(raw.channel.as_deref()),
            non_empty(raw.title.as_deref()),
        ) else {
            tracing::debug!(
                start = raw.start.as_deref().unwrap_or_default(),
                channel = raw.channel.as_deref().unwrap_or_default(),
                "programme without start, channel or title discarded"
            );
            return None;
        };

        let start_zone = timezone_suffix(start_raw);
        let Some(start) = self.feed_time(start_raw, start_zone) else {
            tracing::warn!(channel, start = start_raw, title, "unparsable start time, programme skipped");
            return None;
        };

        let end = non_empty(raw.stop.as_deref()).and_then(|stop_raw| {
            let end = self.feed_time(stop_raw, start_zone);
            if end.is_none() {
                tracing::warn!(channel, stop = stop_raw, title, "unparsable stop time ignored");
            }
            end
        });

        let episode = match (raw.episode_num.as_deref(), raw.episode_num_system.as_deref()) {
            (Some(value), Some("xmltv_ns")) => EpisodeNumbering::parse_xmltv_ns(value),
            _ => EpisodeNumbering::default(),
        };

        Some(NormalizedProgram {
            feed_channel: channel.to_owned(),
            start,
            end: end.unwrap_or(start),
            has_explicit_stop: end.is_some(),
            title: decode_text(title),
            description: raw.description.as_deref().map(decode_text).unwrap_or_default(),
            category: raw
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
            episode_name: raw.sub_title.as_deref().map(decode_text).unwrap_or_default(),
            episode,
            original_air_date: raw.date.clone().unwrap_or_default(),
            repeat: raw.previously_shown.is_some(),
            star_rating: raw
                .star_rating
                .as_deref()
                .map_or(NO_STAR_RATING, parse_star_rating),
            classification: raw.rating.clone().unwrap_or_default(),
        })
    }

    /// Parses, corrects and localizes a feed timestamp.
    ///
    /// `fallback_zone` is used when the value carries no zone suffix.
    fn feed_time(&self, value: &str, fallback_zone: &str) -> Option<NaiveDateTime> {
        let packed = parse_timestamp(value);
        if packed == 0 {
            return None;
        }
        let time = unpack(correct_illegal_date_time(packed));
        if time == NaiveDateTime::MIN {
            return None;
        }

        let zone = match timezone_suffix(value) {
            "" => fallback_zone,
            own => own,
        };
        Some(truncate_to_minute(
            self.correction.apply(time, parse_offset(zone)),
        ))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::{FixedOffset, NaiveDate};

    use super::super::time::LocalZone;
    use super::*;

    fn dt(h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn normalizer() -> ProgramNormalizer {
        ProgramNormalizer::new(TimeCorrection {
            use_time_zone: true,
            fixed_minutes: 0,
            local_zone: LocalZone::Fixed(FixedOffset::east_opt(0).unwrap()),
        })
    }

    fn raw(start: &str, stop: Option<&str>) -> RawProgram {
        RawProgram {
            start: Some(start.to_owned()),
            stop: stop.map(str::to_owned),
            channel: Some("c1".to_owned()),
            title: Some("Title".to_owned()),
            ..RawProgram::default()
        }
    }

    #[test]
    fn test_star_rating_plain() {
        // Arrange & Act & Assert
        assert_eq!(parse_star_rating("5.2/10"), 5);
        assert_eq!(parse_star_rating(" 7 / 10 "), 7);
        assert_eq!(parse_star_rating("10/10"), 10);
    }

    #[test]
    fn test_star_rating_markup() {
        // Arrange & Act & Assert
        assert_eq!(parse_star_rating("<value>7/10</value>"), 7);
    }

    #[test]
    fn test_star_rating_rounds_half_to_even() {
        // Arrange & Act & Assert
        assert_eq!(parse_star_rating("2.5/10"), 2);
        assert_eq!(parse_star_rating("3.5/10"), 4);
    }

    #[test]
    fn test_star_rating_unusable() {
        // Arrange & Act & Assert
        assert_eq!(parse_star_rating(""), NO_STAR_RATING);
        assert_eq!(parse_star_rating("abc/10"), NO_STAR_RATING);
        assert_eq!(parse_star_rating("7"), NO_STAR_RATING);
        assert_eq!(parse_star_rating("11/10"), NO_STAR_RATING);
        assert_eq!(parse_star_rating("-1/10"), NO_STAR_RATING);
        assert_eq!(parse_star_rating("<value></value>"), NO_STAR_RATING);
    }

    #[test]
    fn test_episode_full() {
        // Arrange & Act
        let e = EpisodeNumbering::parse_xmltv_ns("0 . 5 . 0/2");

        // Assert
        assert_eq!(e.series, "0");
        assert_eq!(e.episode, "5");
        assert_eq!(e.part, "1/2");
    }

    #[test]
    fn test_episode_part_of_one_cleared() {
        // Arrange & Act
        let e = EpisodeNumbering::parse_xmltv_ns("2.11.0/1");

        // Assert
        assert_eq!((e.series.as_str(), e.episode.as_str(), e.part.as_str()), ("2", "11", ""));
    }

    #[test]
    fn test_episode_nonzero_part_kept() {
        // Arrange & Act
        let e = EpisodeNumbering::parse_xmltv_ns("1.2.1/3");

        // Assert
        assert_eq!(e.part, "1/3");
    }

    #[test]
    fn test_episode_without_season() {
        // Arrange & Act
        let e = EpisodeNumbering::parse_xmltv_ns(".12.");

        // Assert
        assert_eq!((e.series.as_str(), e.episode.as_str(), e.part.as_str()), ("", "12", ""));
    }

    #[test]
    fn test_episode_season_only() {
        // Arrange & Act
        let e = EpisodeNumbering::parse_xmltv_ns("3");

        // Assert
        assert_eq!(e, EpisodeNumbering { series: "3".to_owned(), ..EpisodeNumbering::default() });
    }

    #[test]
    fn test_episode_without_part() {
        // Arrange & Act
        let e = EpisodeNumbering::parse_xmltv_ns("3.4");

        // Assert
        assert_eq!((e.series.as_str(), e.episode.as_str(), e.part.as_str()), ("3", "4", ""));
    }

    #[test]
    fn test_normalize_basic() {
        // Arrange
        let mut r = raw("20240101200000 +0100", Some("20240101210000 +0100"));
        r.title = Some("A &amp; B".to_owned());
        r.description = Some("one&lt;br&gt;two".to_owned());
        r.previously_shown = Some(String::new());
        r.episode_num = Some("0.4.".to_owned());
        r.episode_num_system = Some("xmltv_ns".to_owned());

        // Act
        let p = normalizer().normalize(&r).unwrap();

        // Assert
        assert_eq!(p.start, dt(19, 0));
        assert_eq!(p.end, dt(20, 0));
        assert!(p.has_explicit_stop);
        assert_eq!(p.title, "A & B");
        assert_eq!(p.description, "one\ntwo");
        assert_eq!(p.category, DEFAULT_CATEGORY);
        assert!(p.repeat);
        assert_eq!(p.star_rating, NO_STAR_RATING);
        assert_eq!(p.episode.episode, "4");
    }

    #[test]
    fn test_normalize_stop_inherits_start_zone() {
        // Arrange
        let r = raw("20240101200000 +0100", Some("20240101210000"));

        // Act
        let p = normalizer().normalize(&r).unwrap();

        // Assert
        assert_eq!(p.end, dt(20, 0));
    }

    #[test]
    fn test_normalize_missing_stop() {
        // Arrange
        let r = raw("202401012000", None);

        // Act
        let p = normalizer().normalize(&r).unwrap();

        // Assert
        assert_eq!(p.start, dt(20, 0));
        assert_eq!(p.end, p.start);
        assert!(!p.has_explicit_stop);
    }

    #[test]
    fn test_normalize_unparsable_stop_treated_as_absent() {
        // Arrange
        let r = raw("202401012000", Some("garbage"));

        // Act
        let p = normalizer().normalize(&r).unwrap();

        // Assert
        assert_eq!(p.end, p.start);
        assert!(!p.has_explicit_stop);
    }

    #[test]
    fn test_normalize_rejects_incomplete() {
        // Arrange
        let mut no_title = raw("202401012000", None);
        no_title.title = Some(String::new());
        let mut no_channel = raw("202401012000", None);
        no_channel.channel = None;
        let bad_start = raw("2024", None);

        // Act & Assert
        assert!(normalizer().normalize(&no_title).is_none());
        assert!(normalizer().normalize(&no_channel).is_none());
        assert!(normalizer().normalize(&bad_start).is_none());
    }

    #[test]
    fn test_normalize_ignores_other_episode_systems() {
        // Arrange
        let mut r = raw("202401012000", None);
        r.episode_num = Some("EP1234".to_owned());
        r.episode_num_system = Some("dd_progid".to_owned());

        // Act
        let p = normalizer().normalize(&r).unwrap();

        // Assert
        assert_eq!(p.episode, EpisodeNumbering::default());
    }
}
