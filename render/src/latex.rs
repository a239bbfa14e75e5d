//! Bracket and parenthesis math in sanitized HTML.
//!
//! After Markdown has consumed the backslashes of `\[ ... \]` and `\( ... \)`, the delimiters
//! reach the HTML as plain brackets. Two passes find them, block (`[...]`) first and inline
//! (`(...)`) second. A formula that fails to render stays exactly as written.
//!
//! Matching walks the parsed fragment and only reads text nodes, so tag markup, attribute values
//! and the contents of `<pre>`/`<code>` are never touched. A formula may span hard-break `<br>`
//! elements between sibling text nodes; they are dropped from its source. It never spans other
//! elements.

use std::ops::Range;
use std::sync::OnceLock;

use markup5ever_rcdom::Handle;
use regex::Regex;

use crate::fragment::Fragment;
use crate::fragment::children;
use crate::fragment::is_element;
use crate::fragment::is_html_element;
use crate::fragment::parse_nodes;
use crate::fragment::replace_children;
use crate::fragment::text;
use crate::fragment::text_node;
use crate::sanitize::clean_math_markup;

/// Stands in for a `<br>` inside a run's text. The HTML parser never leaves NUL in text.
const BREAK: char = '\u{0}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathMode {
    /// `[ ... ]`, rendered as a standalone block.
    Display,
    /// `( ... )`, rendered within the line.
    Inline,
}

#[derive(Debug, thiserror::Error)]
pub enum MathError {
    #[error("failed to render formula: {0}")]
    Render(String),
}

/// Turns one LaTeX formula into display markup.
pub trait MathRenderer {
    fn render(&self, source: &str, mode: MathMode) -> Result<String, MathError>;
}

/// Renders formulas to MathML with `latex2mathml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MathMlRenderer;

impl MathRenderer for MathMlRenderer {
    fn render(&self, source: &str, mode: MathMode) -> Result<String, MathError> {
        let style = match mode {
            MathMode::Display => latex2mathml::DisplayStyle::Block,
            MathMode::Inline => latex2mathml::DisplayStyle::Inline,
        };
        latex2mathml::latex_to_mathml(source, style)
            .map_err(|err| MathError::Render(format!("{err:?}")))
    }
}

/// Render math in `html` with the default MathML renderer.
pub fn render_math(html: &str) -> String {
    render_math_with(&MathMlRenderer, html)
}

/// Render math in `html` with `renderer`. Never fails.
pub fn render_math_with(renderer: &dyn MathRenderer, html: &str) -> String {
    let fragment = Fragment::parse(html);
    render_in(renderer, fragment.root());
    fragment.to_html()
}

/// Rewrite the text runs directly under `parent`, then descend into child elements.
///
/// A run is a maximal sequence of sibling text nodes and `<br>` elements.
fn render_in(renderer: &dyn MathRenderer, parent: &Handle) {
    let nodes = children(parent);
    let mut runs: Vec<Range<usize>> = Vec::new();
    let mut run_start: Option<usize> = None;

    for (index, node) in nodes.iter().enumerate() {
        if text(node).is_some() || is_html_element(node, "br") {
            run_start.get_or_insert(index);
            continue;
        }
        if let Some(start) = run_start.take() {
            runs.push(start..index);
        }
        if is_element(node) && !is_html_element(node, "pre") && !is_html_element(node, "code") {
            render_in(renderer, node);
        }
    }
    if let Some(start) = run_start {
        runs.push(start..nodes.len());
    }

    // Back to front so earlier ranges stay valid.
    for range in runs.into_iter().rev() {
        if let Some(replacement) = transform_run(renderer, &nodes[range.clone()]) {
            replace_children(parent, range, replacement);
        }
    }
}

/// New nodes for a run, or `None` when no formula in it rendered.
fn transform_run(renderer: &dyn MathRenderer, run: &[Handle]) -> Option<Vec<Handle>> {
    let mut source = String::new();
    let mut breaks = Vec::new();
    for node in run {
        match text(node) {
            Some(contents) => source.push_str(&contents),
            None => {
                source.push(BREAK);
                breaks.push(node.clone());
            }
        }
    }
    if !source.contains(['[', '(']) {
        return None;
    }

    let pieces = transform_text(renderer, &source);
    if !pieces.iter().any(|piece| matches!(piece, Piece::Rendered { .. })) {
        return None;
    }

    let mut breaks = breaks.into_iter();
    let mut nodes = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Literal(literal) => {
                for (i, segment) in literal.split(BREAK).enumerate() {
                    if i > 0 {
                        nodes.extend(breaks.next());
                    }
                    if !segment.is_empty() {
                        nodes.push(text_node(segment));
                    }
                }
            }
            Piece::Rendered {
                markup,
                swallowed_breaks,
            } => {
                // Breaks inside a formula are dropped along with its source.
                breaks.by_ref().take(swallowed_breaks).for_each(drop);
                nodes.extend(parse_nodes(&markup));
            }
        }
    }
    Some(nodes)
}

enum Piece {
    Literal(String),
    Rendered {
        markup: String,
        swallowed_breaks: usize,
    },
}

fn transform_text(renderer: &dyn MathRenderer, text: &str) -> Vec<Piece> {
    let block_pass = replace_formulas(renderer, text, block_regex(), MathMode::Display, |_| true);

    // Inline pass only looks at what the block pass left as literal text.
    let mut pieces = Vec::with_capacity(block_pass.len());
    for piece in block_pass {
        match piece {
            Piece::Literal(literal) => pieces.extend(replace_formulas(
                renderer,
                &literal,
                inline_regex(),
                MathMode::Inline,
                looks_like_inline_math,
            )),
            rendered @ Piece::Rendered { .. } => pieces.push(rendered),
        }
    }
    pieces
}

fn replace_formulas(
    renderer: &dyn MathRenderer,
    text: &str,
    pattern: &Regex,
    mode: MathMode,
    accept: impl Fn(&str) -> bool,
) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in pattern.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let source = formula_source(body.as_str());
        if source.is_empty() || !accept(&source) {
            continue;
        }
        let markup = match renderer.render(&source, mode) {
            Ok(markup) => clean_math_markup(&markup),
            Err(err) => {
                tracing::debug!(?mode, "keeping formula as text: {err}");
                continue;
            }
        };
        if last < whole.start() {
            pieces.push(Piece::Literal(text[last..whole.start()].to_string()));
        }
        pieces.push(Piece::Rendered {
            markup,
            swallowed_breaks: whole.as_str().matches(BREAK).count(),
        });
        last = whole.end();
    }
    if last < text.len() {
        pieces.push(Piece::Literal(text[last..].to_string()));
    }
    pieces
}

/// Formula text without hard breaks, trimmed.
fn formula_source(body: &str) -> String {
    body.replace(BREAK, "").trim().to_string()
}

/// Whether parenthesized text is worth trying as inline math.
///
/// Accepts a single letter, anything with a backslash command, or anything using `_`, `^` or
/// `!`. Ordinary parenthetical prose such as "(see below)" is left alone.
fn looks_like_inline_math(source: &str) -> bool {
    let mut chars = source.chars();
    let single_letter = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic());
    single_letter || source.contains('\\') || source.contains(['_', '^', '!'])
}

static BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();
static INLINE_REGEX: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn block_regex() -> &'static Regex {
    BLOCK_REGEX.get_or_init(|| Regex::new(r"(?s)\[(.*?)\]").expect("block math regex is valid"))
}

#[allow(clippy::expect_used)]
fn inline_regex() -> &'static Regex {
    INLINE_REGEX.get_or_init(|| Regex::new(r"(?s)\((.*?)\)").expect("inline math regex is valid"))
}
