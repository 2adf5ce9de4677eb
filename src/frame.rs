//! Frame container and normalization.
//!
//! - `Frame`: packed RGB24 pixel buffer plus capture timestamp.
//! - `normalize`: resize any decoded frame to the canonical pipeline size.
//!
//! Frames are owned by the capture iteration that produced them. Once published
//! they are wrapped in an `Arc` and never mutated again.

use anyhow::{anyhow, Result};
use image::{imageops, imageops::FilterType, RgbImage};
use std::time::SystemTime;

/// Canonical frame width after normalization.
pub const CANONICAL_WIDTH: u32 = 640;

/// Canonical frame height after normalization.
pub const CANONICAL_HEIGHT: u32 = 360;

/// Packed RGB24 frame.
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: SystemTime,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. Fails when the buffer length does not match
    /// the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: SystemTime::now(),
        })
    }

    /// Uniformly filled frame.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = (width as usize) * (height as usize);
        let mut pixels = Vec::with_capacity(count * 3);
        for _ in 0..count {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            pixels,
            width,
            height,
            captured_at: SystemTime::now(),
        }
    }

    pub fn with_timestamp(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Read-only pixel access for detector backends and encoders.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * 3;
        Some([
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ])
    }

    pub fn is_canonical(&self) -> bool {
        self.width == CANONICAL_WIDTH && self.height == CANONICAL_HEIGHT
    }

    pub(crate) fn into_image(self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels)
            .ok_or_else(|| anyhow!("frame buffer does not fit its dimensions"))
    }

    pub(crate) fn from_image(image: RgbImage, captured_at: SystemTime) -> Self {
        let (width, height) = image.dimensions();
        Self {
            pixels: image.into_raw(),
            width,
            height,
            captured_at,
        }
    }
}

impl std::fmt::Debug for Frame {
    // Pixel content stays out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

/// Resize a frame to `width`x`height`. Frames already at that size pass through.
pub fn normalize(frame: Frame, width: u32, height: u32) -> Result<Frame> {
    if frame.width == width && frame.height == height {
        return Ok(frame);
    }
    if width == 0 || height == 0 {
        return Err(anyhow!("target frame size must be non-zero"));
    }
    let captured_at = frame.captured_at;
    let image = frame.into_image()?;
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    Ok(Frame::from_image(resized, captured_at))
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
    Ok(len)
}
