//! Synthetic source (`stub://`) for tests and demos.
//!
//! Produces a gradient background with a bright block that drifts across the
//! frame. `stub://unavailable` refuses to open, which lets tests exercise the
//! start-failure path without touching the filesystem or network.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use url::Url;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    /// Stop after this many frames. `None` runs until closed.
    pub frames: Option<u64>,
    /// Pace reads to this rate. 0 disables pacing.
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl SyntheticConfig {
    pub fn parse(source_id: &str) -> Result<Self> {
        let url = Url::parse(source_id).context("parse stub url")?;
        let name = url.host_str().unwrap_or("synthetic").to_string();
        let mut config = Self {
            name,
            frames: None,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => config.frames = Some(parse_num(&key, &value)?),
                "fps" => config.fps = parse_num(&key, &value)?,
                "width" => config.width = parse_num(&key, &value)?,
                "height" => config.height = parse_num(&key, &value)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub frame size must be non-zero"));
        }
        Ok(config)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' must be a number", key))
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    closed: bool,
}

impl SyntheticSource {
    pub fn open(config: SyntheticConfig) -> Result<Self> {
        if config.name == "unavailable" {
            return Err(anyhow!("synthetic source refused to open"));
        }
        log::info!("synthetic source opened: {}", config.name);
        Ok(Self {
            config,
            frame_count: 0,
            last_frame_at: None,
            closed: false,
        })
    }

    fn pace(&mut self) {
        if self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_millis((1000 / self.config.fps).max(1) as u64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate(&self) -> Result<Frame> {
        let width = self.config.width;
        let height = self.config.height;
        let block = (width / 8).max(1);
        let block_x = ((self.frame_count * 7) % width as u64) as u32;
        let block_y = height / 3;
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let inside = x >= block_x
                    && x < block_x.saturating_add(block)
                    && y >= block_y
                    && y < block_y.saturating_add(block);
                if inside {
                    pixels.extend_from_slice(&[255, 140, 0]);
                } else {
                    let shade = ((x + y) % 256) as u8 / 4;
                    pixels.extend_from_slice(&[shade, shade, shade.saturating_add(16)]);
                }
            }
        }
        Frame::from_rgb(pixels, width, height)
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.config.name)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Err(anyhow!("synthetic source is closed"));
        }
        if let Some(limit) = self.config.frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.pace();
        let frame = self.generate()?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            log::debug!(
                "synthetic source {} closed after {} frames",
                self.config.name,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: self.describe(),
        }
    }
}
