//! The full message rendering pipeline.

use std::fmt;
use std::time::Duration;

use chatmark_protocol::Message;
use chatmark_protocol::image_tag::COMPOSE_MAX_WIDTH;
use chatmark_protocol::image_tag::TRANSMIT_MAX_WIDTH;

use crate::composer::ImageAttachmentEncoder;
use crate::highlight::CodeTheme;
use crate::highlight::highlight_code_blocks;
use crate::latex::render_math;
use crate::markdown::render_markdown;
use crate::pending::PENDING_TICK_PERIOD;
use crate::pending::PendingPlaceholder;
use crate::sanitize::sanitize;

/// Display-ready HTML for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment(String);

impl RenderedFragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RenderedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User-tunable knobs for rendering and composing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub compose_max_width: u32,
    pub transmit_max_width: u32,
    pub pending_period: Duration,
    pub code_theme: CodeTheme,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            compose_max_width: COMPOSE_MAX_WIDTH,
            transmit_max_width: TRANSMIT_MAX_WIDTH,
            pending_period: PENDING_TICK_PERIOD,
            code_theme: CodeTheme::default(),
        }
    }
}

impl RenderSettings {
    pub fn encoder(&self) -> ImageAttachmentEncoder {
        ImageAttachmentEncoder::new(self.compose_max_width, self.transmit_max_width)
    }
}

/// Render message text for display: Markdown, then sanitization, then math, then code
/// highlighting.
///
/// Empty text shows the `pending` placeholder. Never fails; stages that cannot handle a piece
/// of input leave it as it was.
pub fn render_message_text(text: &str, pending: PendingPlaceholder) -> RenderedFragment {
    let html = render_markdown(text, pending);
    let html = sanitize(&html);
    let html = render_math(&html);
    RenderedFragment(highlight_code_blocks(&html))
}

/// Render a stored or streaming message. A message with no text yet shows `pending`.
pub fn render_message(message: &Message, pending: PendingPlaceholder) -> RenderedFragment {
    if message.is_pending() {
        tracing::trace!(author = %message.author, "rendering pending placeholder");
    }
    render_message_text(&message.text, pending)
}
