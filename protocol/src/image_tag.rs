//! Inline image tags carried inside message text.
//!
//! A freshly attached image is written into the composition buffer in the *dual* form, which
//! carries both the compact preview size used while composing and the larger size used once the
//! message is sent:
//!
//! ```text
//! <img src="S" alt="A" width="W1" height="H1" data-original-width="W2" data-original-height="H2">
//! ```
//!
//! At send time [`crate::send::finalize`] collapses it to the *canonical* form:
//!
//! ```text
//! <img src="S" alt="A" width="W2" height="H2">
//! ```

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Captures;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

/// Maximum width of the preview shown in the composer.
pub const COMPOSE_MAX_WIDTH: u32 = 70;

/// Maximum width of the image once the message is sent.
pub const TRANSMIT_MAX_WIDTH: u32 = 600;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale down (never up) so the width fits in `max_width`, keeping the aspect ratio.
    ///
    /// Both axes share one ratio and are rounded independently.
    pub fn scaled_to_max_width(self, max_width: u32) -> Self {
        if self.width == 0 {
            return self;
        }
        let ratio = (f64::from(max_width) / f64::from(self.width)).min(1.0);
        Self {
            width: (f64::from(self.width) * ratio).round() as u32,
            height: (f64::from(self.height) * ratio).round() as u32,
        }
    }
}

/// Structured view of one inline image tag.
///
/// `src` and `alt` hold unescaped values; the tag writers escape them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageTagRecord {
    pub src: String,
    pub alt: String,
    /// Size shown while composing (`width`/`height` of the dual tag).
    pub compose: ImageSize,
    /// Size stored and displayed after send (`data-original-*` of the dual tag).
    pub transmit: ImageSize,
}

impl ImageTagRecord {
    /// Build a record for an image with the given natural size, deriving both display sizes.
    pub fn from_natural_size(
        src: impl Into<String>,
        alt: impl Into<String>,
        natural: ImageSize,
        compose_max_width: u32,
        transmit_max_width: u32,
    ) -> Self {
        Self {
            src: src.into(),
            alt: alt.into(),
            compose: natural.scaled_to_max_width(compose_max_width),
            transmit: natural.scaled_to_max_width(transmit_max_width),
        }
    }

    pub fn to_dual_tag(&self) -> String {
        format!(
            r#"<img src="{src}" alt="{alt}" width="{cw}" height="{ch}" data-original-width="{tw}" data-original-height="{th}">"#,
            src = escape_attribute(&self.src),
            alt = escape_attribute(&self.alt),
            cw = self.compose.width,
            ch = self.compose.height,
            tw = self.transmit.width,
            th = self.transmit.height,
        )
    }

    pub fn to_canonical_tag(&self) -> String {
        format!(
            r#"<img src="{src}" alt="{alt}" width="{tw}" height="{th}">"#,
            src = escape_attribute(&self.src),
            alt = escape_attribute(&self.alt),
            tw = self.transmit.width,
            th = self.transmit.height,
        )
    }

    /// Parse a string that is exactly one dual tag.
    pub fn parse_dual_tag(tag: &str) -> Option<Self> {
        let caps = dual_tag_regex().captures(tag)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != tag.len() {
            return None;
        }
        let dims = DualTagCaptures::from_captures(&caps)?;
        Some(Self {
            src: unescape_attribute(dims.src).into_owned(),
            alt: unescape_attribute(dims.alt).into_owned(),
            compose: ImageSize::new(dims.compose_width.parse().ok()?, dims.compose_height.parse().ok()?),
            transmit: ImageSize::new(dims.transmit_width.parse().ok()?, dims.transmit_height.parse().ok()?),
        })
    }
}

/// Raw (still escaped) pieces of a dual tag match.
pub(crate) struct DualTagCaptures<'t> {
    pub src: &'t str,
    pub alt: &'t str,
    pub compose_width: &'t str,
    pub compose_height: &'t str,
    pub transmit_width: &'t str,
    pub transmit_height: &'t str,
}

impl<'t> DualTagCaptures<'t> {
    pub(crate) fn from_captures(caps: &Captures<'t>) -> Option<Self> {
        Some(Self {
            src: caps.name("src")?.as_str(),
            alt: caps.name("alt")?.as_str(),
            compose_width: caps.name("cw")?.as_str(),
            compose_height: caps.name("ch")?.as_str(),
            transmit_width: caps.name("tw")?.as_str(),
            transmit_height: caps.name("th")?.as_str(),
        })
    }
}

static DUAL_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

/// Exact six-field grammar. `[0-9]` rather than `\d`, which would also accept non-ASCII digits.
#[allow(clippy::expect_used)]
pub(crate) fn dual_tag_regex() -> &'static Regex {
    DUAL_TAG_REGEX.get_or_init(|| {
        Regex::new(
            r#"<img src="(?P<src>[^"]*)" alt="(?P<alt>[^"]*)" width="(?P<cw>[0-9]+)" height="(?P<ch>[0-9]+)" data-original-width="(?P<tw>[0-9]+)" data-original-height="(?P<th>[0-9]+)">"#,
        )
        .expect("dual image tag regex is valid")
    })
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '"', '<', '>']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn unescape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&quot;", "\"")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}
