//! HTTP MJPEG / JPEG snapshot source.
//!
//! ESP32-CAM style boards expose either a `multipart/x-mixed-replace` MJPEG
//! stream or a single-JPEG snapshot endpoint. The content type of the first
//! response decides which mode is used. Reads are bounded by the agent's read
//! timeout, so a stalled camera ends the session instead of hanging it.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::io::Read;
use std::time::Duration;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct MjpegConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl MjpegConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }
}

pub struct MjpegSource {
    config: MjpegConfig,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl MjpegSource {
    /// Connect and classify the endpoint. Fails when the endpoint cannot be reached.
    pub fn open(config: MjpegConfig) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .build();
        let response = agent
            .get(&config.url)
            .call()
            .with_context(|| format!("connect to {}", config.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        let stream = if content_type.contains("multipart") {
            HttpStream::Mjpeg(MjpegStream::new(Box::new(response.into_reader())))
        } else {
            HttpStream::SingleJpeg
        };
        log::info!(
            "http source connected to {} ({})",
            config.url,
            match stream {
                HttpStream::Mjpeg(_) => "mjpeg",
                HttpStream::SingleJpeg => "snapshot",
            }
        );
        Ok(Self {
            config,
            agent,
            stream: Some(stream),
            frame_count: 0,
        })
    }

    fn fetch_single_jpeg(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.config.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        Ok(bytes)
    }
}

impl FrameSource for MjpegSource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let jpeg = match self.stream.as_mut() {
            Some(HttpStream::Mjpeg(stream)) => match stream.read_next_jpeg()? {
                Some(jpeg) => jpeg,
                None => return Ok(None),
            },
            Some(HttpStream::SingleJpeg) => self.fetch_single_jpeg()?,
            None => return Err(anyhow!("http source is closed")),
        };
        let frame = decode_jpeg(&jpeg)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!(
                "http source {} closed after {} frames",
                self.config.url,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

/// Splits a multipart MJPEG byte stream into JPEG images by SOI/EOI markers.
struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn decode_jpeg(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    Frame::from_rgb(image.into_rgb8().into_raw(), width, height)
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
