// Forbid accidental stdout/stderr writes in the library portion of the renderer.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod fragment;

pub mod composer;
pub mod highlight;
pub mod latex;
pub mod layout;
pub mod markdown;
pub mod pending;
pub mod pipeline;
pub mod sanitize;

pub use composer::AttachmentError;
pub use composer::Composer;
pub use composer::ImageAttachmentEncoder;
pub use highlight::CodeTheme;
pub use highlight::highlight_code_blocks;
pub use highlight::set_code_theme;
pub use latex::MathRenderer;
pub use latex::render_math;
pub use markdown::render_markdown;
pub use pending::PENDING_TICK_PERIOD;
pub use pending::PendingPlaceholder;
pub use pending::PendingTicker;
pub use pipeline::RenderSettings;
pub use pipeline::RenderedFragment;
pub use pipeline::render_message;
pub use pipeline::render_message_text;
pub use sanitize::sanitize;
