//! Markdown to HTML conversion for chat messages.
//!
//! Conversion runs pulldown-cmark with tables, strikethrough and smart punctuation, then adapts
//! the event stream for chat: every soft line break becomes a hard break and bare URLs become
//! links. The resulting HTML gets a fixed set of layout substitutions (see [`crate::layout`]).
//!
//! Output is *not* safe to display; it must go through [`crate::sanitize::sanitize`] first.

use std::sync::OnceLock;

use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::LinkType;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use pulldown_cmark::TagEnd;
use pulldown_cmark::html;
use regex::Regex;

use crate::layout::HEADING_STYLE;
use crate::layout::ORDERED_LIST_STYLE;
use crate::layout::PRE_STYLE;
use crate::layout::UNORDERED_LIST_STYLE;
use crate::pending::PendingPlaceholder;

/// Convert message text to (unsanitized) HTML.
///
/// Empty text renders the pending placeholder instead, without typographic substitution so the
/// dots are shown as typed.
pub fn render_markdown(text: &str, pending: PendingPlaceholder) -> String {
    let (source, smart_punctuation) = if text.is_empty() {
        (pending.dots(), false)
    } else {
        (text, true)
    };

    let parser = Parser::new_ext(source, parser_options(smart_punctuation));
    let events = chat_events(parser);

    let mut html_output = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut html_output, events.into_iter());
    apply_layout(&html_output)
}

fn parser_options(smart_punctuation: bool) -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    if smart_punctuation {
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
    }
    options
}

/// Rewrite soft breaks as hard breaks and autolink bare URLs outside links, images and code.
///
/// Adjacent text events are merged first; pulldown-cmark may split a URL at characters that
/// could start inline markup.
fn chat_events<'a>(parser: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut text = String::new();
    let mut link_depth = 0usize;
    let mut in_code_block = false;

    for event in parser {
        if let Event::Text(chunk) = &event {
            text.push_str(chunk);
            continue;
        }
        flush_text(&mut out, &mut text, link_depth > 0 || in_code_block);

        match event {
            Event::SoftBreak => out.push(Event::HardBreak),
            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. })) => {
                link_depth += 1;
                out.push(Event::Start(tag));
            }
            Event::End(tag @ (TagEnd::Link | TagEnd::Image)) => {
                link_depth = link_depth.saturating_sub(1);
                out.push(Event::End(tag));
            }
            Event::Start(tag @ Tag::CodeBlock(_)) => {
                in_code_block = true;
                out.push(Event::Start(tag));
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push(Event::End(TagEnd::CodeBlock));
            }
            other => out.push(other),
        }
    }
    flush_text(&mut out, &mut text, link_depth > 0 || in_code_block);
    out
}

fn flush_text<'a>(out: &mut Vec<Event<'a>>, text: &mut String, verbatim: bool) {
    if text.is_empty() {
        return;
    }
    let text = std::mem::take(text);
    if verbatim {
        out.push(Event::Text(text.into()));
    } else {
        push_autolinked(out, &text);
    }
}

static BARE_URL_REGEX: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn bare_url_regex() -> &'static Regex {
    BARE_URL_REGEX.get_or_init(|| {
        Regex::new(r"\b(?:https?://|www\.)[^\s<>]+").expect("bare URL regex is valid")
    })
}

fn push_autolinked<'a>(out: &mut Vec<Event<'a>>, text: &str) {
    let mut last = 0;
    for m in bare_url_regex().find_iter(text) {
        let url = trim_url_suffix(m.as_str());
        if url.is_empty() || url == "www." {
            continue;
        }
        if last < m.start() {
            out.push(Event::Text(text[last..m.start()].to_string().into()));
        }
        let dest = if url.starts_with("www.") {
            format!("http://{url}")
        } else {
            url.to_string()
        };
        out.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: dest.into(),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        out.push(Event::Text(url.to_string().into()));
        out.push(Event::End(TagEnd::Link));
        last = m.start() + url.len();
    }
    if last < text.len() {
        out.push(Event::Text(text[last..].to_string().into()));
    }
}

/// Drop trailing punctuation that belongs to the sentence rather than the URL.
///
/// A closing parenthesis is kept while it balances an opening one inside the URL.
fn trim_url_suffix(url: &str) -> &str {
    let mut url = url;
    loop {
        let Some(last) = url.chars().last() else {
            return url;
        };
        let strip = match last {
            '.' | ',' | ':' | ';' | '!' | '?' | '\'' | '"' | '*' | '_' | '\u{201d}' | '\u{2019}' => {
                true
            }
            ')' => url.matches(')').count() > url.matches('(').count(),
            _ => false,
        };
        if !strip {
            return url;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
}

/// Layout substitutions over converted HTML, in a fixed order.
///
/// Each rule matches canonical tag names only, so applying the whole set twice yields the same
/// result as applying it once.
pub(crate) fn apply_layout(html: &str) -> String {
    // Paragraphs become plain blocks for tighter spacing.
    let mut out = html.replace("<p>", "<div>").replace("</p>", "</div>");

    // No page titles inside a chat bubble.
    out = out.replace("<h1>", "<h2>").replace("</h1>", "</h2>");
    for level in 2..=6 {
        out = out.replace(
            &format!("<h{level}>"),
            &format!("<h{level} style=\"{HEADING_STYLE}\">"),
        );
    }

    out = out.replace("<ul>", &format!("<ul style=\"{UNORDERED_LIST_STYLE}\">"));
    out = out
        .replace("<ol>", &format!("<ol style=\"{ORDERED_LIST_STYLE}\">"))
        .replace("<ol start=", &format!("<ol style=\"{ORDERED_LIST_STYLE}\" start="));

    out.replace("<pre>", &format!("<pre style=\"{PRE_STYLE}\">"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(text: &str) -> String {
        render_markdown(text, PendingPlaceholder::default())
    }

    #[test]
    fn paragraphs_become_divs() {
        assert_eq!(render("hello\n\nworld"), "<div>hello</div>\n<div>world</div>\n");
    }

    #[test]
    fn top_heading_is_demoted_and_all_headings_get_margin() {
        assert_eq!(
            render("# Title\n\n### Sub"),
            format!(
                "<h2 style=\"{HEADING_STYLE}\">Title</h2>\n<h3 style=\"{HEADING_STYLE}\">Sub</h3>\n"
            )
        );
    }

    #[test]
    fn list_kinds_get_distinct_layout() {
        assert_eq!(
            render("- a\n- b"),
            format!("<ul style=\"{UNORDERED_LIST_STYLE}\">\n<li>a</li>\n<li>b</li>\n</ul>\n")
        );
        assert!(render("1. a\n2. b").starts_with(&format!("<ol style=\"{ORDERED_LIST_STYLE}\">")));
        assert!(
            render("3. c\n4. d")
                .starts_with(&format!("<ol style=\"{ORDERED_LIST_STYLE}\" start=\"3\">"))
        );
    }

    #[test]
    fn code_blocks_soft_wrap() {
        assert_eq!(
            render("```rust\nfn main() {}\n```"),
            format!(
                "<pre style=\"{PRE_STYLE}\"><code class=\"language-rust\">fn main() {{}}\n</code></pre>\n"
            )
        );
    }

    #[test]
    fn single_newlines_are_hard_breaks() {
        assert_eq!(render("a\nb"), "<div>a<br />\nb</div>\n");
    }

    #[test]
    fn bare_urls_are_linked() {
        assert_eq!(
            render("see https://example.com/docs."),
            "<div>see <a href=\"https://example.com/docs\">https://example.com/docs</a>.</div>\n"
        );
        assert_eq!(
            render("www.example.com"),
            "<div><a href=\"http://www.example.com\">www.example.com</a></div>\n"
        );
    }

    #[test]
    fn autolink_leaves_links_and_code_alone() {
        assert_eq!(
            render("[docs](https://a.example)"),
            "<div><a href=\"https://a.example\">docs</a></div>\n"
        );
        assert_eq!(
            render("`https://a.example`"),
            "<div><code>https://a.example</code></div>\n"
        );
        assert!(!render("```\nhttps://a.example\n```").contains("<a "));
    }

    #[test]
    fn url_suffix_trimming_balances_parens() {
        assert_eq!(
            trim_url_suffix("https://en.wikipedia.org/wiki/Rust_(language))."),
            "https://en.wikipedia.org/wiki/Rust_(language)"
        );
        assert_eq!(trim_url_suffix("https://a.example/x)"), "https://a.example/x");
    }

    #[test]
    fn smart_punctuation_is_enabled() {
        assert_eq!(
            render("\"quoted\" -- yes"),
            "<div>\u{201c}quoted\u{201d} \u{2013} yes</div>\n"
        );
    }

    #[test]
    fn tables_render() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.starts_with("<table><thead><tr><th>a</th><th>b</th></tr></thead>"));
        assert!(html.contains("<td>1</td><td>2</td>"));
    }

    #[test]
    fn empty_text_renders_placeholder_verbatim() {
        assert_eq!(render_markdown("", PendingPlaceholder::One), "<div>.</div>\n");
        assert_eq!(render_markdown("", PendingPlaceholder::Three), "<div>...</div>\n");
    }

    #[test]
    fn layout_is_idempotent() {
        let html = "<h1>t</h1>\n<p>x</p>\n<ul>\n<li>a</li>\n</ul>\n<ol start=\"2\">\n<li>b</li>\n</ol>\n<pre><code>c\n</code></pre>\n";
        let once = apply_layout(html);
        assert_eq!(apply_layout(&once), once);
    }
}
