//! Streaming XMLTV reader.
//!
//! Walks the direct children of the document root one element at a
//! time, so memory stays bounded by the largest single `<channel>` or
//! `<programme>`. Unrelated elements are skipped wholesale.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};

use super::entities::decode_entities;
use super::types::{FeedChannel, RawProgram};

/// How the content of a captured child element is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// Concatenated, decoded text.
    Text,
    /// Inner markup reproduced verbatim.
    Markup,
}

/// Receives the children of a `<channel>` or `<programme>` element.
trait ChildSink {
    /// Returns how to read `element`, or `None` to skip its subtree.
    fn wants(&self, element: &BytesStart<'_>) -> Option<Capture>;

    /// Stores the captured content of an element accepted by `wants`.
    fn accept(
        &mut self,
        element: &BytesStart<'_>,
        content: String,
        decoder: Decoder,
    ) -> Result<()>;
}

/// Where the reader currently is in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeRoot,
    InRoot,
    Finished,
}

/// Pull-based reader over an XMLTV document.
pub struct XmltvReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    skip_buf: Vec<u8>,
    position: Position,
}

impl<R> std::fmt::Debug for XmltvReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmltvReader")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl XmltvReader<BufReader<File>> {
    /// Opens an XMLTV file for streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open xmltv file {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> XmltvReader<R> {
    /// Creates a reader over any buffered source.
    pub fn from_reader(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::new(),
            skip_buf: Vec::new(),
            position: Position::BeforeRoot,
        }
    }

    /// Returns the next `<channel>` element, skipping everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not well-formed. The reader
    /// yields nothing after an error.
    pub fn next_channel(&mut self) -> Result<Option<FeedChannel>> {
        let result = self.read_next::<FeedChannel>("channel", |start, decoder| {
            Ok(FeedChannel {
                id: attribute(start, "id", decoder)?,
                display_name: None,
            })
        });
        self.finish_on_error(result)
    }

    /// Returns the next `<programme>` element, skipping everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not well-formed. The reader
    /// yields nothing after an error.
    pub fn next_programme(&mut self) -> Result<Option<RawProgram>> {
        let result = self.read_next::<RawProgram>("programme", |start, decoder| {
            Ok(RawProgram {
                start: attribute(start, "start", decoder)?,
                stop: attribute(start, "stop", decoder)?,
                channel: attribute(start, "channel", decoder)?,
                ..RawProgram::default()
            })
        });
        self.finish_on_error(result)
    }

    /// Consumes the reader into an iterator over channels.
    pub const fn channels(self) -> Channels<R> {
        Channels { reader: self }
    }

    /// Consumes the reader into an iterator over programmes.
    pub const fn programmes(self) -> Programmes<R> {
        Programmes { reader: self }
    }

    fn finish_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.position = Position::Finished;
        }
        result
    }

    /// Reads the next root child named `wanted` into a `T`.
    fn read_next<T: ChildSink>(
        &mut self,
        wanted: &str,
        init: impl FnOnce(&BytesStart<'_>, Decoder) -> Result<T>,
    ) -> Result<Option<T>> {
        let Some((start, empty)) = self.next_root_child(wanted)? else {
            return Ok(None);
        };
        let mut item = init(&start, self.reader.decoder())?;
        if !empty {
            self.read_children(&start, &mut item)?;
        }
        Ok(Some(item))
    }

    /// Advances to the next direct child of the root element named `wanted`.
    ///
    /// Returns the start tag and whether it was self-closing.
    fn next_root_child(&mut self, wanted: &str) -> Result<Option<(BytesStart<'static>, bool)>> {
        loop {
            if self.position == Position::Finished {
                return Ok(None);
            }
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| xml_error_context(self.reader.buffer_position()))?;

            match (self.position, event) {
                (_, Event::Eof) => {
                    self.position = Position::Finished;
                    return Ok(None);
                }
                (Position::BeforeRoot, Event::Start(_)) => self.position = Position::InRoot,
                (Position::BeforeRoot, Event::Empty(_)) | (Position::InRoot, Event::End(_)) => {
                    self.position = Position::Finished;
                    return Ok(None);
                }
                (Position::InRoot, Event::Start(e)) => {
                    if is_named(&e, wanted) {
                        return Ok(Some((e.into_owned(), false)));
                    }
                    let end = e.to_end().into_owned();
                    self.skip_buf.clear();
                    self.reader
                        .read_to_end_into(end.name(), &mut self.skip_buf)
                        .with_context(|| xml_error_context(self.reader.buffer_position()))?;
                }
                (Position::InRoot, Event::Empty(e)) if is_named(&e, wanted) => {
                    return Ok(Some((e.into_owned(), true)));
                }
                _ => {}
            }
        }
    }

    /// Feeds the children of `parent` into `sink` up to the closing tag.
    fn read_children(&mut self, parent: &BytesStart<'_>, sink: &mut impl ChildSink) -> Result<()> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| xml_error_context(self.reader.buffer_position()))?;

            match event {
                Event::Start(e) => {
                    let child = e.into_owned();
                    match sink.wants(&child) {
                        Some(capture) => {
                            let content = self.read_content(capture)?;
                            sink.accept(&child, content, self.reader.decoder())?;
                        }
                        None => {
                            self.skip_buf.clear();
                            self.reader
                                .read_to_end_into(child.name(), &mut self.skip_buf)
                                .with_context(|| {
                                    xml_error_context(self.reader.buffer_position())
                                })?;
                        }
                    }
                }
                Event::Empty(e) => {
                    if sink.wants(&e).is_some() {
                        let child = e.into_owned();
                        sink.accept(&child, String::new(), self.reader.decoder())?;
                    }
                }
                Event::End(_) => return Ok(()),
                Event::Eof => bail!(
                    "unexpected end of document inside <{}>",
                    element_name(parent)
                ),
                _ => {}
            }
        }
    }

    /// Reads the content of the element whose start tag was just consumed.
    #[allow(clippy::arithmetic_side_effects)]
    fn read_content(&mut self, capture: Capture) -> Result<String> {
        let markup = capture == Capture::Markup;
        let mut depth = 0usize;
        let mut out = String::new();

        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| xml_error_context(self.reader.buffer_position()))?;
            let decoder = self.reader.decoder();

            match event {
                Event::Text(t) => out.push_str(&decode(decoder, &t)?),
                Event::GeneralRef(r) => {
                    out.push('&');
                    out.push_str(&decode(decoder, &r)?);
                    out.push(';');
                }
                Event::CData(c) => {
                    let text = decode(decoder, &c)?;
                    if markup {
                        out.push_str("<![CDATA[");
                        out.push_str(&text);
                        out.push_str("]]>");
                    } else {
                        // keep '&' literal through the decode below
                        out.push_str(&text.replace('&', "&amp;"));
                    }
                }
                Event::Start(s) => {
                    depth += 1;
                    if markup {
                        out.push('<');
                        out.push_str(&decode(decoder, &s)?);
                        out.push('>');
                    }
                }
                Event::Empty(s) => {
                    if markup {
                        out.push('<');
                        out.push_str(&decode(decoder, &s)?);
                        out.push_str("/>");
                    }
                }
                Event::End(e) => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    if markup {
                        out.push_str("</");
                        out.push_str(&decode(decoder, e.name().as_ref())?);
                        out.push('>');
                    }
                }
                Event::Eof => bail!("unexpected end of document inside element content"),
                _ => {}
            }
        }

        if markup {
            Ok(out.trim().to_owned())
        } else {
            Ok(decode_entities(out.trim()).into_owned())
        }
    }
}

/// Iterator over the `<channel>` elements of a document.
#[derive(Debug)]
pub struct Channels<R> {
    reader: XmltvReader<R>,
}

impl<R: BufRead> Iterator for Channels<R> {
    type Item = Result<FeedChannel>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_channel().transpose()
    }
}

/// Iterator over the `<programme>` elements of a document.
#[derive(Debug)]
pub struct Programmes<R> {
    reader: XmltvReader<R>,
}

impl<R: BufRead> Iterator for Programmes<R> {
    type Item = Result<RawProgram>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_programme().transpose()
    }
}

impl ChildSink for FeedChannel {
    fn wants(&self, element: &BytesStart<'_>) -> Option<Capture> {
        (self.display_name.is_none() && is_named(element, "display-name")).then_some(Capture::Text)
    }

    fn accept(
        &mut self,
        _element: &BytesStart<'_>,
        content: String,
        _decoder: Decoder,
    ) -> Result<()> {
        if !content.is_empty() {
            self.display_name = Some(content);
        }
        Ok(())
    }
}

/// Programme children that are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramField {
    Title,
    Category,
    Description,
    SubTitle,
    PreviouslyShown,
    EpisodeNum,
    Date,
    StarRating,
    Rating,
}

impl ProgramField {
    const ALL: [(&'static str, Self); 9] = [
        ("title", Self::Title),
        ("category", Self::Category),
        ("desc", Self::Description),
        ("sub-title", Self::SubTitle),
        ("previously-shown", Self::PreviouslyShown),
        ("episode-num", Self::EpisodeNum),
        ("date", Self::Date),
        ("star-rating", Self::StarRating),
        ("rating", Self::Rating),
    ];

    fn of(element: &BytesStart<'_>) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(name, _)| is_named(element, name))
            .map(|(_, field)| *field)
    }

    const fn capture(self) -> Capture {
        match self {
            Self::StarRating | Self::Rating => Capture::Markup,
            _ => Capture::Text,
        }
    }
}

impl RawProgram {
    const fn slot(&self, field: ProgramField) -> &Option<String> {
        match field {
            ProgramField::Title => &self.title,
            ProgramField::Category => &self.category,
            ProgramField::Description => &self.description,
            ProgramField::SubTitle => &self.sub_title,
            ProgramField::PreviouslyShown => &self.previously_shown,
            ProgramField::EpisodeNum => &self.episode_num,
            ProgramField::Date => &self.date,
            ProgramField::StarRating => &self.star_rating,
            ProgramField::Rating => &self.rating,
        }
    }

    const fn slot_mut(&mut self, field: ProgramField) -> &mut Option<String> {
        match field {
            ProgramField::Title => &mut self.title,
            ProgramField::Category => &mut self.category,
            ProgramField::Description => &mut self.description,
            ProgramField::SubTitle => &mut self.sub_title,
            ProgramField::PreviouslyShown => &mut self.previously_shown,
            ProgramField::EpisodeNum => &mut self.episode_num,
            ProgramField::Date => &mut self.date,
            ProgramField::StarRating => &mut self.star_rating,
            ProgramField::Rating => &mut self.rating,
        }
    }
}

impl ChildSink for RawProgram {
    fn wants(&self, element: &BytesStart<'_>) -> Option<Capture> {
        let field = ProgramField::of(element)?;
        self.slot(field).is_none().then_some(field.capture())
    }

    fn accept(
        &mut self,
        element: &BytesStart<'_>,
        content: String,
        decoder: Decoder,
    ) -> Result<()> {
        let Some(field) = ProgramField::of(element) else {
            return Ok(());
        };
        if field == ProgramField::EpisodeNum {
            self.episode_num_system = attribute(element, "system", decoder)?;
        }
        *self.slot_mut(field) = Some(content);
        Ok(())
    }
}

/// Case-insensitive element name comparison.
fn is_named(element: &BytesStart<'_>, name: &str) -> bool {
    element.name().as_ref().eq_ignore_ascii_case(name.as_bytes())
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

/// Reads an attribute value and resolves its references.
fn attribute(element: &BytesStart<'_>, name: &str, decoder: Decoder) -> Result<Option<String>> {
    let Some(attr) = element
        .try_get_attribute(name)
        .with_context(|| format!("malformed attributes on <{}>", element_name(element)))?
    else {
        return Ok(None);
    };
    let value = decode(decoder, &attr.value)?;
    Ok(Some(decode_entities(&value).into_owned()))
}

/// Decodes raw bytes using the encoding declared by the document.
fn decode(decoder: Decoder, bytes: &[u8]) -> Result<Cow<'_, str>> {
    decoder
        .decode(bytes)
        .context("text is not valid in the declared encoding")
}

fn xml_error_context(position: u64) -> String {
    format!("malformed XML near byte {position}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn reader(xml: &str) -> XmltvReader<&[u8]> {
        XmltvReader::from_reader(xml.as_bytes())
    }

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="c1.example">
    <display-name></display-name>
    <display-name>Channel &amp; One</display-name>
    <display-name>Ignored</display-name>
    <icon src="http://example.com/c1.png"/>
  </channel>
  <channel id="c2.example"/>
  <programme start="20240101200000 +0100" stop="20240101210000 +0100" channel="c1.example">
    <title lang="en">News &amp; Weather</title>
    <title lang="de">Nachrichten</title>
    <desc>Line one&lt;br&gt;line two</desc>
    <credits><director>Someone</director></credits>
    <category>News</category>
    <episode-num system="dd_progid">EP1234</episode-num>
    <episode-num system="xmltv_ns">0 . 5 . 0/1</episode-num>
    <previously-shown/>
    <star-rating><value>7/10</value></star-rating>
    <rating system="MPAA"><value>PG</value></rating>
  </programme>
  <programme start="20240101210000" channel="c2.example"><title><![CDATA[A & B]]></title></programme>
</tv>
"#;

    #[test]
    fn test_channels_first_non_empty_display_name() {
        // Arrange
        let r = reader(SAMPLE);

        // Act
        let channels: Vec<FeedChannel> = r.channels().collect::<Result<_>>().unwrap();

        // Assert
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id.as_deref(), Some("c1.example"));
        assert_eq!(channels[0].display_name.as_deref(), Some("Channel & One"));
        assert_eq!(channels[1].id.as_deref(), Some("c2.example"));
        assert_eq!(channels[1].display_name, None);
    }

    #[test]
    fn test_programmes_capture_first_occurrence() {
        // Arrange
        let r = reader(SAMPLE);

        // Act
        let programmes: Vec<RawProgram> = r.programmes().collect::<Result<_>>().unwrap();

        // Assert
        assert_eq!(programmes.len(), 2);
        let p = &programmes[0];
        assert_eq!(p.start.as_deref(), Some("20240101200000 +0100"));
        assert_eq!(p.stop.as_deref(), Some("20240101210000 +0100"));
        assert_eq!(p.channel.as_deref(), Some("c1.example"));
        assert_eq!(p.title.as_deref(), Some("News & Weather"));
        assert_eq!(p.description.as_deref(), Some("Line one<br>line two"));
        assert_eq!(p.category.as_deref(), Some("News"));
        assert_eq!(p.episode_num.as_deref(), Some("EP1234"));
        assert_eq!(p.episode_num_system.as_deref(), Some("dd_progid"));
        assert_eq!(p.previously_shown.as_deref(), Some(""));
        assert_eq!(p.star_rating.as_deref(), Some("<value>7/10</value>"));
        assert_eq!(p.rating.as_deref(), Some("<value>PG</value>"));
        assert_eq!(p.date, None);
    }

    #[test]
    fn test_programme_cdata_and_missing_stop() {
        // Arrange
        let r = reader(SAMPLE);

        // Act
        let programmes: Vec<RawProgram> = r.programmes().collect::<Result<_>>().unwrap();

        // Assert
        let p = &programmes[1];
        assert_eq!(p.stop, None);
        assert_eq!(p.title.as_deref(), Some("A & B"));
    }

    #[test]
    fn test_element_names_case_insensitive() {
        // Arrange
        let xml = r#"<TV><Channel id="c"><Display-Name>Upper</Display-Name></Channel></TV>"#;

        // Act
        let channels: Vec<FeedChannel> = reader(xml).channels().collect::<Result<_>>().unwrap();

        // Assert
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name.as_deref(), Some("Upper"));
    }

    #[test]
    fn test_html_entities_tolerated() {
        // Arrange
        let xml = "<tv><programme start=\"202401012000\" channel=\"c\">\
                   <title>Caf&eacute; &bogus; &#233;</title></programme></tv>";

        // Act
        let programmes: Vec<RawProgram> = reader(xml).programmes().collect::<Result<_>>().unwrap();

        // Assert
        assert_eq!(programmes[0].title.as_deref(), Some("Café &bogus; é"));
    }

    #[test]
    fn test_malformed_document_errors_once() {
        // Arrange
        let xml = "<tv><programme start=\"1\" channel=\"c\"><title>x</desc></programme></tv>";
        let mut iter = reader(xml).programmes();

        // Act
        let first = iter.next();
        let second = iter.next();

        // Assert
        assert!(matches!(first, Some(Err(_))));
        assert!(second.is_none());
    }

    #[test]
    fn test_empty_document() {
        // Arrange
        let xml = "<?xml version=\"1.0\"?><tv/>";

        // Act
        let count = reader(xml).channels().count();

        // Assert
        assert_eq!(count, 0);
    }

    #[test]
    fn test_declared_latin1_encoding_decoded() {
        // Arrange
        let xml: &[u8] = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
<tv><programme start=\"20240101200000\" channel=\"caf\xE9.example\">\
<title>Caf\xE9</title><desc>\xC0 la carte</desc></programme></tv>";

        // Act
        let programmes: Vec<_> = XmltvReader::from_reader(xml)
            .programmes()
            .collect::<Result<_>>()
            .unwrap();

        // Assert
        assert_eq!(programmes.len(), 1);
        assert_eq!(programmes[0].channel.as_deref(), Some("café.example"));
        assert_eq!(programmes[0].title.as_deref(), Some("Café"));
        assert_eq!(programmes[0].description.as_deref(), Some("À la carte"));
    }
}
