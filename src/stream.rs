//! Continuous image stream for viewers.
//!
//! Every viewer gets its own `FrameStream`: an endless iterator that yields the
//! latest published frame each time the shared generation moves, and re-sends
//! the current image every `refresh` interval while nothing changes. With no
//! frame published (or when encoding fails) the placeholder image is sent.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::annotate::{placeholder, PLACEHOLDER_TEXT};
use crate::encode::FrameEncoder;
use crate::session::{PublishedFrame, SharedPublishedState};

pub const BOUNDARY: &str = "frame";

/// One encoded image ready to send.
#[derive(Clone, Debug)]
pub struct StreamImage {
    pub bytes: Arc<Vec<u8>>,
    /// Generation of the shared state this image was taken from.
    pub generation: u64,
    pub is_placeholder: bool,
}

pub struct StreamBroadcaster {
    published: Arc<SharedPublishedState>,
    encoder: Arc<dyn FrameEncoder>,
    placeholder: Arc<Vec<u8>>,
    refresh: Duration,
}

impl StreamBroadcaster {
    /// Pre-encodes the placeholder; fails only if the encoder cannot encode at all.
    pub fn new(
        published: Arc<SharedPublishedState>,
        encoder: Arc<dyn FrameEncoder>,
        width: u32,
        height: u32,
        refresh: Duration,
    ) -> Result<Self> {
        let placeholder = encoder
            .encode(&placeholder(width, height, PLACEHOLDER_TEXT))
            .context("encode placeholder frame")?;
        Ok(Self {
            published,
            encoder,
            placeholder: Arc::new(placeholder),
            refresh,
        })
    }

    pub fn content_type(&self) -> &'static str {
        self.encoder.content_type()
    }

    /// The image a viewer connecting now would see first.
    pub fn current(&self) -> StreamImage {
        let generation = self.published.generation();
        self.image_for(generation, self.published.latest())
    }

    pub fn subscribe(self: &Arc<Self>) -> FrameStream {
        FrameStream {
            broadcaster: self.clone(),
            seen: None,
        }
    }

    fn image_for(&self, generation: u64, latest: Option<Arc<PublishedFrame>>) -> StreamImage {
        let Some(latest) = latest else {
            return self.placeholder_image(generation);
        };
        match latest.encoded(self.encoder.as_ref()) {
            Ok(bytes) => StreamImage {
                bytes,
                generation,
                is_placeholder: false,
            },
            Err(err) => {
                log::warn!("frame {} failed to encode: {:#}", latest.generation, err);
                self.placeholder_image(generation)
            }
        }
    }

    fn placeholder_image(&self, generation: u64) -> StreamImage {
        StreamImage {
            bytes: self.placeholder.clone(),
            generation,
            is_placeholder: true,
        }
    }
}

/// Per-viewer image sequence. Never ends; the viewer's connection does.
pub struct FrameStream {
    broadcaster: Arc<StreamBroadcaster>,
    seen: Option<u64>,
}

impl Iterator for FrameStream {
    type Item = StreamImage;

    fn next(&mut self) -> Option<StreamImage> {
        let image = match self.seen {
            None => self.broadcaster.current(),
            Some(seen) => {
                let (generation, latest) = self
                    .broadcaster
                    .published
                    .wait_for_change(seen, self.broadcaster.refresh);
                self.broadcaster.image_for(generation, latest)
            }
        };
        self.seen = Some(image.generation);
        Some(image)
    }
}

/// Write one multipart part: boundary, headers, image bytes.
pub fn write_part<W: Write>(out: &mut W, content_type: &str, bytes: &[u8]) -> std::io::Result<()> {
    write!(
        out,
        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        content_type,
        bytes.len()
    )?;
    out.write_all(bytes)?;
    out.write_all(b"\r\n")?;
    out.flush()
}
