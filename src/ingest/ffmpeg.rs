//! FFmpeg-backed decoder for local files and RTSP streams.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct FfmpegSource {
    location: String,
    input: Option<ffmpeg::format::context::Input>,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
}

// SAFETY: the source is opened on the supervisor thread and then moved, whole, into
// exactly one capture worker. FFmpeg contexts are never shared between threads.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(location: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&location)
            .with_context(|| format!("failed to open '{}' with ffmpeg", location))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("input has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "ffmpeg source opened: {} ({}x{})",
            location,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            location: location.to_string(),
            input: Some(input),
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn describe(&self) -> String {
        self.location.clone()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg source is closed"))?;

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;

            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let frame = frame_to_rgb(&rgb_frame)?;
                self.frame_count += 1;
                return Ok(Some(frame));
            }
        }

        Ok(None)
    }

    fn close(&mut self) {
        if self.input.take().is_some() {
            log::debug!(
                "ffmpeg source {} closed after {} frames",
                self.location,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: self.location.clone(),
        }
    }
}

fn frame_to_rgb(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Frame::from_rgb(data[..row_bytes * height as usize].to_vec(), width, height);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Frame::from_rgb(pixels, width, height)
}
