//! Raw element data read from an XMLTV document.

/// A `<channel>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedChannel {
    /// Value of the `id` attribute.
    pub id: Option<String>,
    /// First non-empty `<display-name>`.
    pub display_name: Option<String>,
}

/// Field values of one `<programme>` element, as found in the document.
///
/// Text fields hold XML-decoded text; `star_rating` and `rating` hold the
/// inner markup of their element. Empty elements are `Some("")`, absent
/// ones `None`. Only the first occurrence of each child is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProgram {
    /// `start` attribute.
    pub start: Option<String>,
    /// `stop` attribute.
    pub stop: Option<String>,
    /// `channel` attribute.
    pub channel: Option<String>,
    /// `<title>`.
    pub title: Option<String>,
    /// `<category>`.
    pub category: Option<String>,
    /// `<desc>`.
    pub description: Option<String>,
    /// `<sub-title>`.
    pub sub_title: Option<String>,
    /// `<previously-shown>` (presence marks a repeat).
    pub previously_shown: Option<String>,
    /// `<episode-num>`.
    pub episode_num: Option<String>,
    /// `system` attribute of the captured `<episode-num>`.
    pub episode_num_system: Option<String>,
    /// `<date>`.
    pub date: Option<String>,
    /// Inner markup of `<star-rating>`.
    pub star_rating: Option<String>,
    /// Inner markup of `<rating>`.
    pub rating: Option<String>,
}
