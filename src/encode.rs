//! Frame to transportable image.

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;

pub trait FrameEncoder: Send + Sync {
    /// MIME type of the encoded bytes, used for multipart part headers.
    fn content_type(&self) -> &'static str;

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>>;
}

#[derive(Clone, Copy, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(80)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode(
                frame.pixels(),
                frame.width,
                frame.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
        Ok(buffer)
    }
}
