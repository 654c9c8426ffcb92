//! XMLTV feed handling.
//!
//! Streams `<channel>` and `<programme>` elements out of an XMLTV
//! document and turns them into validated, locally-timed programmes.

mod entities;
mod normalize;
mod reader;
mod time;
mod types;

pub use entities::{decode_entities, decode_text};
pub use normalize::{
    DEFAULT_CATEGORY, EpisodeNumbering, NO_STAR_RATING, NormalizedProgram, ProgramNormalizer,
    parse_star_rating,
};
pub use reader::{Channels, Programmes, XmltvReader};
pub use time::{
    LocalZone, PackedTime, TimeCorrection, correct_illegal_date_time, pack, parse_offset,
    parse_timestamp, timezone_suffix, truncate_to_minute, unpack,
};
pub use types::{FeedChannel, RawProgram};
