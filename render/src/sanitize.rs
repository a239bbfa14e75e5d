//! HTML sanitization: the single security boundary of the rendering pipeline.
//!
//! Everything the Markdown converter produces, including raw HTML the author typed, passes
//! through [`sanitize`] before any later stage touches it. The policy is an explicit allow-list
//! built on [`ammonia`]; anything not listed is dropped silently.

use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use ammonia::UrlRelative;
use markup5ever_rcdom::Handle;

use crate::fragment::Fragment;
use crate::fragment::children;
use crate::fragment::first_child;
use crate::fragment::is_element;
use crate::fragment::is_html_element;
use crate::fragment::replace_children;
use crate::fragment::text;
use crate::fragment::text_node;

use crate::layout::HEADING_STYLE;
use crate::layout::ORDERED_LIST_STYLE;
use crate::layout::PRE_STYLE;
use crate::layout::TABLE_CELL_STYLES;
use crate::layout::UNORDERED_LIST_STYLE;

const ALLOWED_TAGS: &[&str] = &[
    "a",
    "b",
    "blockquote",
    "br",
    "code",
    "del",
    "div",
    "em",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "img",
    "li",
    "ol",
    "p",
    "pre",
    "s",
    "span",
    "strong",
    "sub",
    "sup",
    "table",
    "tbody",
    "td",
    "th",
    "thead",
    "tr",
    "ul",
];

const STYLED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "pre", "th", "td",
];

const IMAGE_ATTRIBUTES: &[&str] = &[
    "src",
    "alt",
    "title",
    "width",
    "height",
    "data-original-width",
    "data-original-height",
];

const MATHML_TAGS: &[&str] = &[
    "math",
    "menclose",
    "merror",
    "mfrac",
    "mi",
    "mmultiscripts",
    "mn",
    "mo",
    "mover",
    "mpadded",
    "mphantom",
    "mprescripts",
    "mroot",
    "mrow",
    "ms",
    "mspace",
    "msqrt",
    "mstyle",
    "msub",
    "msubsup",
    "msup",
    "mtable",
    "mtd",
    "mtext",
    "mtr",
    "munder",
    "munderover",
    "none",
];

const MATHML_ATTRIBUTES: &[&str] = &[
    "accent",
    "accentunder",
    "columnalign",
    "depth",
    "display",
    "displaystyle",
    "fence",
    "height",
    "linethickness",
    "lspace",
    "mathvariant",
    "movablelimits",
    "notation",
    "rspace",
    "scriptlevel",
    "separator",
    "stretchy",
    "symmetric",
    "width",
];

static HTML_POLICY: OnceLock<Builder<'static>> = OnceLock::new();
static MATH_POLICY: OnceLock<Builder<'static>> = OnceLock::new();

fn html_policy() -> &'static Builder<'static> {
    HTML_POLICY.get_or_init(build_html_policy)
}

fn build_html_policy() -> Builder<'static> {
    let mut tag_attributes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
    tag_attributes.insert("a", HashSet::from(["href"]));
    tag_attributes.insert("img", IMAGE_ATTRIBUTES.iter().copied().collect());
    tag_attributes.insert("code", HashSet::from(["class"]));
    tag_attributes.insert("ol", HashSet::from(["start"]));
    for &tag in STYLED_TAGS {
        tag_attributes.entry(tag).or_default().insert("style");
    }

    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .clean_content_tags(HashSet::from(["script", "style"]))
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .url_schemes(HashSet::from(["http", "https", "mailto", "data"]))
        .url_relative(UrlRelative::PassThrough)
        .link_rel(Some("noopener noreferrer"))
        .strip_comments(true)
        .attribute_filter(filter_attribute);
    builder
}

/// Second-stage checks on attributes that already passed the allow-list.
fn filter_attribute<'u>(element: &str, attribute: &str, value: &'u str) -> Option<Cow<'u, str>> {
    let keep = match attribute {
        "style" => is_layout_style(element, value),
        "class" => is_language_class(value),
        "src" if element == "img" => !has_scheme(value, "data") || is_image_data_uri(value),
        "href" => !has_scheme(value, "data"),
        _ => true,
    };
    keep.then_some(Cow::Borrowed(value))
}

fn is_layout_style(element: &str, value: &str) -> bool {
    match element {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => value == HEADING_STYLE,
        "ul" => value == UNORDERED_LIST_STYLE,
        "ol" => value == ORDERED_LIST_STYLE,
        "pre" => value == PRE_STYLE,
        "th" | "td" => TABLE_CELL_STYLES.contains(&value),
        _ => false,
    }
}

fn is_language_class(value: &str) -> bool {
    let mut classes = value.split_ascii_whitespace().peekable();
    classes.peek().is_some()
        && classes.all(|class| {
            class.strip_prefix("language-").is_some_and(|lang| {
                !lang.is_empty()
                    && lang
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#' | '.'))
            })
        })
}

fn has_scheme(url: &str, scheme: &str) -> bool {
    let url = url.trim_start();
    url.as_bytes().get(scheme.len()) == Some(&b':')
        && url
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

fn is_image_data_uri(url: &str) -> bool {
    url.trim_start()
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
}

/// Strip everything that could execute script or escape the fragment from untrusted HTML.
///
/// Idempotent: sanitizing an already sanitized fragment returns it unchanged.
pub fn sanitize(html: &str) -> String {
    let cleaned = html_policy().clean(html).to_string();
    let fragment = Fragment::parse(&cleaned);
    trim_preformatted_leading_newlines(fragment.root());
    fragment.to_html()
}

/// Drop newlines at the very start of `<pre>` text.
///
/// The parser swallows one newline right after `<pre>` and the serializer never writes it back,
/// so any that remained would shrink by one on every pass.
fn trim_preformatted_leading_newlines(parent: &Handle) {
    for node in children(parent) {
        if is_html_element(&node, "pre")
            && let Some(first) = first_child(&node)
            && let Some(contents) = text(&first)
        {
            let trimmed = contents.trim_start_matches('\n');
            if trimmed.len() != contents.len() {
                let replacement = if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![text_node(trimmed)]
                };
                replace_children(&node, 0..1, replacement);
            }
        }
        if is_element(&node) {
            trim_preformatted_leading_newlines(&node);
        }
    }
}

fn math_policy() -> &'static Builder<'static> {
    MATH_POLICY.get_or_init(|| {
        let tag_attributes: HashMap<&'static str, HashSet<&'static str>> = MATHML_TAGS
            .iter()
            .map(|tag| (*tag, MATHML_ATTRIBUTES.iter().copied().collect()))
            .collect();
        let mut builder = Builder::default();
        builder
            .tags(MATHML_TAGS.iter().copied().collect())
            .clean_content_tags(HashSet::from(["script", "style"]))
            .tag_attributes(tag_attributes)
            .generic_attributes(HashSet::new())
            .url_schemes(HashSet::new())
            .link_rel(None)
            .strip_comments(true);
        builder
    })
}

/// Restrict generated math markup to presentational MathML.
///
/// Applied to every fragment the math stage inserts after [`sanitize`] has run.
pub fn clean_math_markup(markup: &str) -> String {
    math_policy().clean(markup).to_string()
}
