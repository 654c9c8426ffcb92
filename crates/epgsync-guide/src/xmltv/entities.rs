//! Lenient character reference decoding.
//!
//! Feeds routinely carry HTML entities (`&eacute;`, `&nbsp;`) that are
//! not valid XML, as well as double-escaped text. References that
//! cannot be resolved are left in place rather than failing the feed.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Matches `&name;`, `&#123;` and `&#x1F;` references.
#[allow(clippy::expect_used)]
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9A-Fa-f]+|[A-Za-z][A-Za-z0-9]*);")
        .expect("valid entity regex")
});

/// Decodes named and numeric character references.
///
/// Unknown names and invalid code points are kept verbatim.
#[must_use]
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    REFERENCE_RE.replace_all(raw, |caps: &Captures<'_>| {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        caps.get(1)
            .and_then(|name| resolve(name.as_str()))
            .unwrap_or_else(|| whole.to_owned())
    })
}

/// Decodes references and turns `<br>` into line breaks.
#[must_use]
pub fn decode_text(raw: &str) -> String {
    decode_entities(raw).replace("<br>", "\n")
}

/// Resolves the body of a single reference (without `&` and `;`).
fn resolve(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_html5_entity(name).map(str::to_owned)
}
