//! Message composition with inline image attachments.
//!
//! Selecting an image reads and decodes it in the background, then appends a dual-size
//! [`ImageTagRecord`] tag to the buffer. Taking the buffer for sending collapses those tags to
//! their transmit size with [`chatmark_protocol::send::finalize`].

use std::io::Cursor;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chatmark_protocol::ImageSize;
use chatmark_protocol::ImageTagRecord;
use chatmark_protocol::image_tag::COMPOSE_MAX_WIDTH;
use chatmark_protocol::image_tag::TRANSMIT_MAX_WIDTH;
use chatmark_protocol::send::finalize;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a recognized image format")]
    UnknownFormat { path: PathBuf },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image decoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Turns image files into inline tags sized for the composer and for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageAttachmentEncoder {
    pub compose_max_width: u32,
    pub transmit_max_width: u32,
}

impl Default for ImageAttachmentEncoder {
    fn default() -> Self {
        Self {
            compose_max_width: COMPOSE_MAX_WIDTH,
            transmit_max_width: TRANSMIT_MAX_WIDTH,
        }
    }
}

impl ImageAttachmentEncoder {
    pub fn new(compose_max_width: u32, transmit_max_width: u32) -> Self {
        Self {
            compose_max_width,
            transmit_max_width,
        }
    }

    /// Read `path`, measure it and embed it as a base64 `data:` URI.
    ///
    /// The alt text is the file name. Decoding runs on the blocking pool.
    pub async fn encode_file(&self, path: &Path) -> Result<ImageTagRecord, AttachmentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AttachmentError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let owned_path = path.to_path_buf();
        let (src, natural) =
            tokio::task::spawn_blocking(move || encode_bytes(&owned_path, bytes)).await??;

        let alt = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(
            path = %path.display(),
            width = natural.width,
            height = natural.height,
            "encoded image attachment"
        );
        Ok(ImageTagRecord::from_natural_size(
            src,
            alt,
            natural,
            self.compose_max_width,
            self.transmit_max_width,
        ))
    }
}

/// Build the `data:` URI and read the natural size. The whole image is decoded so truncated or
/// corrupted files are rejected here rather than by whoever displays the tag.
fn encode_bytes(path: &Path, bytes: Vec<u8>) -> Result<(String, ImageSize), AttachmentError> {
    let reader = image::ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .map_err(|source| AttachmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let format = reader.format().ok_or_else(|| AttachmentError::UnknownFormat {
        path: path.to_path_buf(),
    })?;
    let image = reader.decode().map_err(|source| AttachmentError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (image.width(), image.height());

    let src = format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        STANDARD.encode(&bytes)
    );
    Ok((src, ImageSize::new(width, height)))
}

/// Text being composed, plus at most one image attachment in flight.
#[derive(Debug, Default)]
pub struct Composer {
    text: String,
    encoder: ImageAttachmentEncoder,
    attachment: Option<JoinHandle<Result<ImageTagRecord, AttachmentError>>>,
}

impl Composer {
    pub fn new(encoder: ImageAttachmentEncoder) -> Self {
        Self {
            text: String::new(),
            encoder,
            attachment: None,
        }
    }

    /// Start with existing buffer contents, e.g. a saved draft.
    pub fn with_text(encoder: ImageAttachmentEncoder, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            encoder,
            attachment: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn insert_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn has_pending_attachment(&self) -> bool {
        self.attachment.is_some()
    }

    /// Begin encoding `path` in the background. A newer selection supersedes an unfinished one.
    pub fn select_image(&mut self, path: impl Into<PathBuf>) {
        self.cancel_attachment();
        let path = path.into();
        let encoder = self.encoder;
        self.attachment = Some(tokio::spawn(async move { encoder.encode_file(&path).await }));
    }

    pub fn cancel_attachment(&mut self) {
        if let Some(handle) = self.attachment.take() {
            handle.abort();
        }
    }

    /// Wait for the in-flight attachment and append its tag to the buffer.
    ///
    /// Returns whether a tag was appended. A failed encode is logged and leaves the buffer as it
    /// was.
    pub async fn wait_for_attachment(&mut self) -> bool {
        let Some(handle) = self.attachment.take() else {
            return false;
        };
        match handle.await {
            Ok(Ok(record)) => {
                self.text.push_str(&record.to_dual_tag());
                true
            }
            Ok(Err(err)) => {
                tracing::warn!("image attachment skipped: {err}");
                false
            }
            Err(err) if err.is_cancelled() => false,
            Err(err) => {
                tracing::warn!("image attachment task failed: {err}");
                false
            }
        }
    }

    /// Empty the buffer and return its contents ready for transmission.
    pub fn take_for_send(&mut self) -> String {
        finalize(&std::mem::take(&mut self.text))
    }
}
