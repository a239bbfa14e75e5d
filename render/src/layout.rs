//! Inline layout styles injected into converted Markdown.
//!
//! The sanitizer accepts a `style` attribute only when its value is exactly one of these, so any
//! style the author wrote by hand is dropped while the renderer's own layout survives.

/// Vertical margin applied to every heading level.
pub const HEADING_STYLE: &str = "margin-top: 12px; margin-bottom: 12px";

/// Unordered lists: vertical flex column with a fixed gap between items.
pub const UNORDERED_LIST_STYLE: &str =
    "display: flex; flex-direction: column; gap: 10px; margin-top: 10px; margin-bottom: 10px";

/// Ordered lists: no inter-item gap, larger outer margin.
pub const ORDERED_LIST_STYLE: &str = "gap: 0px; margin-top: 20px; margin-bottom: 20px";

/// Preformatted blocks wrap long lines instead of scrolling horizontally.
pub const PRE_STYLE: &str = "white-space: pre-wrap; word-wrap: break-word; overflow-wrap: anywhere";

/// Cell alignments pulldown-cmark emits for table columns.
pub const TABLE_CELL_STYLES: [&str; 3] = [
    "text-align: left",
    "text-align: center",
    "text-align: right",
];
