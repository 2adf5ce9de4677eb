//! Video sources.
//!
//! A source identifier selects the backend:
//! - `stub://name[?frames=N&fps=F&width=W&height=H]`: synthetic frames (tests, demos)
//! - `http(s)://...`: MJPEG stream or single-JPEG snapshot endpoint (ESP32-CAM style)
//! - `rtsp://...` and local file paths: FFmpeg decode (feature: ingest-ffmpeg)
//!
//! Opening is eager: `open_source` either returns a connected source or
//! `PipelineError::SourceUnavailable`. After that, `read` yields frames until
//! the input ends (`Ok(None)`) or fails; the capture loop treats both as the end
//! of the session.

#[cfg(feature = "ingest-ffmpeg")]
mod ffmpeg;
mod mjpeg;
mod synthetic;

use anyhow::Result;

use crate::error::PipelineError;
use crate::frame::Frame;

#[cfg(feature = "ingest-ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use mjpeg::{MjpegConfig, MjpegSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// One opened video input.
pub trait FrameSource: Send {
    /// Human-readable identifier for logs.
    fn describe(&self) -> String;

    /// Read the next decoded frame. `Ok(None)` marks a clean end of input.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying handle. Must be safe to call more than once.
    fn close(&mut self);

    fn stats(&self) -> SourceStats;
}

/// Counters kept by every source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_read: u64,
    pub source: String,
}

/// Open a source by identifier, failing fast when it cannot be opened.
pub fn open_source(source_id: &str) -> Result<Box<dyn FrameSource>, PipelineError> {
    let source_id = source_id.trim();
    if source_id.is_empty() {
        return Err(PipelineError::source_unavailable(
            source_id,
            "empty source identifier",
        ));
    }

    if source_id.starts_with("stub://") {
        let config = SyntheticConfig::parse(source_id)
            .map_err(|e| PipelineError::source_unavailable(source_id, e))?;
        let source = SyntheticSource::open(config)
            .map_err(|e| PipelineError::source_unavailable(source_id, e))?;
        return Ok(Box::new(source));
    }

    if source_id.starts_with("http://") || source_id.starts_with("https://") {
        let source = MjpegSource::open(MjpegConfig::new(source_id))
            .map_err(|e| PipelineError::source_unavailable(source_id, format!("{:#}", e)))?;
        return Ok(Box::new(source));
    }

    open_decoded(source_id)
}

#[cfg(feature = "ingest-ffmpeg")]
fn open_decoded(source_id: &str) -> Result<Box<dyn FrameSource>, PipelineError> {
    if !source_id.contains("://") && !std::path::Path::new(source_id).exists() {
        return Err(PipelineError::source_unavailable(source_id, "no such file"));
    }
    let source = FfmpegSource::open(source_id)
        .map_err(|e| PipelineError::source_unavailable(source_id, format!("{:#}", e)))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ingest-ffmpeg"))]
fn open_decoded(source_id: &str) -> Result<Box<dyn FrameSource>, PipelineError> {
    if !source_id.contains("://") && !std::path::Path::new(source_id).exists() {
        return Err(PipelineError::source_unavailable(source_id, "no such file"));
    }
    Err(PipelineError::source_unavailable(
        source_id,
        "file and RTSP ingestion require the ingest-ffmpeg feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifier_is_unavailable() {
        let err = open_source("  ").err().expect("must fail");
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = open_source("/definitely/not/here.mp4")
            .err()
            .expect("must fail");
        match err {
            PipelineError::SourceUnavailable { source_id, .. } => {
                assert_eq!(source_id, "/definitely/not/here.mp4")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn stub_source_opens() {
        let mut source = open_source("stub://lobby?frames=2&fps=0").expect("open stub");
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
        source.close();
    }
}
