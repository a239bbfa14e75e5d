//! Syntax highlighting for code blocks in rendered fragments.
//!
//! Wraps [syntect] with the [two_face] grammar and theme bundles to provide
//! ~250-language syntax highlighting, emitted as inline-styled `<span>`s.
//!
//! Only `<pre>` elements whose single child is a `<code>` holding a single text node are touched;
//! they are found by walking the parsed fragment, and everything else is serialized back as it
//! was. The language comes from the `language-*` class
//! the Markdown converter writes; blocks without one get first-line detection (shebangs, modelines).
//!
//! **Guardrails:** inputs exceeding 512 KB or 10 000 lines are left plain to prevent
//! pathological CPU/memory usage, as are blocks in an unrecognized language.

use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::RwLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::FontStyle;
use syntect::highlighting::Style as SyntectStyle;
use syntect::highlighting::Theme;
use syntect::html::IncludeBackground;
use syntect::html::styled_line_to_highlighted_html;
use syntect::parsing::SyntaxReference;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use two_face::theme::EmbeddedThemeName;

use markup5ever_rcdom::Handle;

use crate::fragment::Fragment;
use crate::fragment::attribute;
use crate::fragment::children;
use crate::fragment::is_element;
use crate::fragment::is_html_element;
use crate::fragment::parse_nodes;
use crate::fragment::replace_children;
use crate::fragment::text;

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME: OnceLock<RwLock<Theme>> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(two_face::syntax::extra_newlines)
}

/// Color scheme used for highlighted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeTheme {
    #[default]
    Dark,
    Light,
}

impl CodeTheme {
    fn embedded_theme_name(self) -> EmbeddedThemeName {
        match self {
            CodeTheme::Dark => EmbeddedThemeName::CatppuccinMocha,
            CodeTheme::Light => EmbeddedThemeName::CatppuccinLatte,
        }
    }
}

impl FromStr for CodeTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(CodeTheme::Dark),
            "light" => Ok(CodeTheme::Light),
            other => Err(format!("unknown code theme `{other}` (expected `dark` or `light`)")),
        }
    }
}

fn build_theme(theme: CodeTheme) -> Theme {
    let theme_set = two_face::theme::extra();
    theme_set.get(theme.embedded_theme_name()).clone()
}

fn theme_lock() -> &'static RwLock<Theme> {
    THEME.get_or_init(|| RwLock::new(build_theme(CodeTheme::default())))
}

/// Switch the process-wide highlighting theme.
pub fn set_code_theme(theme: CodeTheme) {
    let mut guard = match theme_lock().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = build_theme(theme);
}

// -- Syntax lookup ------------------------------------------------------------

/// Try to find a syntect `SyntaxReference` for the given language identifier.
///
/// two-face's extended syntax set (~250 languages) resolves most names and
/// extensions directly. We only patch the few aliases it cannot handle.
fn find_syntax(lang: &str) -> Option<&'static SyntaxReference> {
    let ss = syntax_set();

    // Aliases that two-face does not resolve on its own.
    let patched = match lang {
        "csharp" | "c-sharp" => "c#",
        "golang" => "go",
        "python3" => "python",
        "shell" | "console" => "bash",
        _ => lang,
    };

    // Try by token (matches file_extensions case-insensitively).
    if let Some(s) = ss.find_syntax_by_token(patched) {
        return Some(s);
    }
    // Try by exact syntax name (e.g. "Rust", "Python").
    if let Some(s) = ss.find_syntax_by_name(patched) {
        return Some(s);
    }
    // Try case-insensitive name match (e.g. "rust" -> "Rust").
    let lower = patched.to_ascii_lowercase();
    if let Some(s) = ss
        .syntaxes()
        .iter()
        .find(|s| s.name.to_ascii_lowercase() == lower)
    {
        return Some(s);
    }
    // Try raw input as file extension.
    ss.find_syntax_by_extension(lang)
}

/// Guess a syntax from the first line of an unlabeled block.
fn detect_syntax(code: &str) -> Option<&'static SyntaxReference> {
    let first_line = code.lines().next()?;
    syntax_set().find_syntax_by_first_line(first_line)
}

fn declared_language(code: &Handle) -> Option<String> {
    attribute(code, "class")?
        .split_ascii_whitespace()
        .find_map(|class| class.strip_prefix("language-"))
        .map(str::to_string)
}

// -- Guardrail constants ------------------------------------------------------

const MAX_HIGHLIGHT_BYTES: usize = 512 * 1024;
const MAX_HIGHLIGHT_LINES: usize = 10_000;

// -- Core highlighting --------------------------------------------------------

/// Themes like Dracula put underline on type scopes; it reads as a link in a chat bubble.
fn adjust_style(mut style: SyntectStyle) -> SyntectStyle {
    style.font_style.remove(FontStyle::UNDERLINE);
    style
}

fn highlight_to_html(code: &str, syntax: &SyntaxReference) -> Option<String> {
    if code.is_empty() {
        return None;
    }

    // Count actual lines (not newline bytes) to avoid an off-by-one when
    // the input does not end with a newline.
    if code.len() > MAX_HIGHLIGHT_BYTES || code.lines().count() > MAX_HIGHLIGHT_LINES {
        return None;
    }

    let theme_guard = match theme_lock().read() {
        Ok(theme_guard) => theme_guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mut h = HighlightLines::new(syntax, &theme_guard);
    let mut html = String::with_capacity(code.len() * 4);

    for line in LinesWithEndings::from(code) {
        let ranges: Vec<(SyntectStyle, &str)> = h
            .highlight_line(line, syntax_set())
            .ok()?
            .into_iter()
            .map(|(style, text)| (adjust_style(style), text))
            .collect();
        html.push_str(&styled_line_to_highlighted_html(&ranges, IncludeBackground::No).ok()?);
    }

    Some(html)
}

/// Colorize the contents of every `<pre><code>` block in a sanitized fragment.
///
/// Blocks whose language is unknown, that hold anything but text, or that exceed the guardrails
/// are returned byte-identical, as is everything outside code blocks.
pub fn highlight_code_blocks(html: &str) -> String {
    let fragment = Fragment::parse(html);
    highlight_in(fragment.root());
    fragment.to_html()
}

fn highlight_in(parent: &Handle) {
    for node in children(parent) {
        if is_html_element(&node, "pre") {
            highlight_block(&node);
        } else if is_element(&node) {
            highlight_in(&node);
        }
    }
}

fn highlight_block(pre: &Handle) {
    let pre_children = children(pre);
    let [code] = pre_children.as_slice() else {
        return;
    };
    if !is_html_element(code, "code") {
        return;
    }
    let code_children = children(code);
    let [leaf] = code_children.as_slice() else {
        return;
    };
    let Some(source) = text(leaf) else {
        return;
    };

    let syntax = match declared_language(code) {
        Some(lang) => find_syntax(&lang),
        None => detect_syntax(&source),
    };
    let Some(syntax) = syntax else {
        tracing::debug!("leaving code block unhighlighted: no matching syntax");
        return;
    };
    if let Some(body) = highlight_to_html(&source, syntax) {
        replace_children(code, 0..1, parse_nodes(&body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Text content of highlighted markup, with tags removed and references decoded.
    fn visible_text(html: &str) -> String {
        let fragment = Fragment::parse(html);
        crate::fragment::text_content(fragment.root())
    }

    #[test]
    fn highlights_declared_language() {
        let html = r#"<pre style="white-space: pre-wrap"><code class="language-rust">fn main() {}
</code></pre>"#;
        let out = highlight_code_blocks(html);
        assert!(
            out.starts_with(r#"<pre style="white-space: pre-wrap"><code class="language-rust"><span style="color:#"#),
            "{out}"
        );
        assert!(out.ends_with("</code></pre>"), "{out}");
        assert_eq!(visible_text(&out), "fn main() {}\n");
    }

    #[test]
    fn unknown_language_is_unchanged() {
        let html = r#"<pre><code class="language-xyzlang">some random text
</code></pre>"#;
        assert_eq!(highlight_code_blocks(html), html);
    }

    #[test]
    fn surrounding_content_is_unchanged() {
        let html = concat!(
            "<div>a &amp; b</div>",
            r#"<pre><code class="language-python">x = 1
</code></pre>"#,
            "<div>c</div>",
        );
        let out = highlight_code_blocks(html);
        assert!(
            out.starts_with(r#"<div>a &amp; b</div><pre><code class="language-python"><span"#),
            "{out}"
        );
        assert!(out.ends_with("</code></pre><div>c</div>"), "{out}");
        assert_eq!(visible_text(&out), "a & bx = 1\nc");
    }

    #[test]
    fn escaped_source_stays_escaped() {
        let html = r#"<pre><code class="language-rust">if a &lt; b { c &amp;&amp; d }
</code></pre>"#;
        let out = highlight_code_blocks(html);
        assert!(out.contains("&lt;"), "{out}");
        assert!(!out.contains("a <"), "{out}");
        assert_eq!(visible_text(&out), "if a < b { c && d }\n");
    }

    #[test]
    fn inline_code_and_markup_blocks_are_unchanged() {
        let inline = r#"<div><code class="language-rust">fn x</code></div>"#;
        assert_eq!(highlight_code_blocks(inline), inline);

        let nested = r#"<pre><code class="language-rust"><b>x</b></code></pre>"#;
        assert_eq!(highlight_code_blocks(nested), nested);

        let empty = r#"<pre><code class="language-rust"></code></pre>"#;
        assert_eq!(highlight_code_blocks(empty), empty);
    }

    #[test]
    fn nested_blocks_are_found() {
        let html = r#"<blockquote><ul><li><pre><code class="language-toml">a = 1
</code></pre></li></ul></blockquote>"#;
        let out = highlight_code_blocks(html);
        assert!(
            out.starts_with(r#"<blockquote><ul><li><pre><code class="language-toml"><span"#),
            "{out}"
        );
        assert!(out.ends_with("</code></pre></li></ul></blockquote>"), "{out}");
        assert_eq!(visible_text(&out), "a = 1\n");
    }

    #[test]
    fn unlabeled_block_uses_first_line_detection() {
        let html = "<pre><code>#!/bin/bash\necho hi\n</code></pre>";
        let out = highlight_code_blocks(html);
        assert!(out.contains("<span style="), "{out}");
        assert_eq!(visible_text(&out), "#!/bin/bash\necho hi\n");

        let plain = "<pre><code>just words\n</code></pre>";
        assert_eq!(highlight_code_blocks(plain), plain);
    }

    #[test]
    fn theme_switch_changes_colors() {
        let html = r#"<pre><code class="language-rust">fn main() {}</code></pre>"#;
        set_code_theme(CodeTheme::Light);
        let light = highlight_code_blocks(html);
        set_code_theme(CodeTheme::Dark);
        let dark = highlight_code_blocks(html);
        assert_ne!(light, dark);
    }

    #[test]
    fn code_theme_parses() {
        assert_eq!("Light".parse::<CodeTheme>(), Ok(CodeTheme::Light));
        assert_eq!(" dark ".parse::<CodeTheme>(), Ok(CodeTheme::Dark));
        assert!("solarized".parse::<CodeTheme>().is_err());
    }

    #[test]
    fn oversized_input_is_left_plain() {
        let Some(rust) = find_syntax("rust") else {
            panic!("rust syntax missing");
        };
        let big = "x".repeat(MAX_HIGHLIGHT_BYTES + 1);
        assert!(highlight_to_html(&big, rust).is_none());
        let many_lines = "let x = 1;\n".repeat(MAX_HIGHLIGHT_LINES + 1);
        assert!(highlight_to_html(&many_lines, rust).is_none());
    }

    #[test]
    fn find_syntax_resolves_languages_and_aliases() {
        let languages = [
            "javascript",
            "typescript",
            "python",
            "rust",
            "go",
            "c",
            "cpp",
            "yaml",
            "bash",
            "sql",
            "java",
            "c#",
            "html",
            "css",
            "json",
            "toml",
        ];
        for lang in languages {
            assert!(
                find_syntax(lang).is_some(),
                "find_syntax({lang:?}) returned None"
            );
        }

        for alias in ["csharp", "c-sharp", "golang", "python3", "shell", "console"] {
            assert!(
                find_syntax(alias).is_some(),
                "find_syntax({alias:?}) returned None; patched alias broken"
            );
        }
        assert!(find_syntax("xyzlang").is_none());
    }
}
