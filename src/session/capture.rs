use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{CancellationToken, SharedPublishedState};
use crate::annotate::{annotate, OverlayMetrics};
use crate::detect::{ActiveDetector, DetectionSummary, DetectionWorker};
use crate::error::PipelineError;
use crate::frame::{self, Frame};
use crate::ingest::{self, FrameSource};
use crate::sensor::SensorCache;

const DETECT_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);
const FAILURE_LOG_EVERY: u64 = 50;

/// Everything a capture worker needs besides its source.
#[derive(Clone)]
pub struct CaptureContext {
    pub detector: Arc<ActiveDetector>,
    pub published: Arc<SharedPublishedState>,
    pub sensor_cache: Arc<SensorCache>,
    pub frame_skip: u32,
    pub width: u32,
    pub height: u32,
    pub detect_timeout: Duration,
}

#[derive(Default)]
struct Counters {
    frames_read: AtomicU64,
    frames_processed: AtomicU64,
    detection_failures: AtomicU64,
    fps_bits: AtomicU64,
}

/// Point-in-time copy of a session's counters.
#[derive(Clone, Debug, Serialize)]
pub struct SessionStats {
    pub session_id: u64,
    pub source: String,
    pub frames_read: u64,
    pub frames_processed: u64,
    pub detection_failures: u64,
    pub fps: f64,
}

/// A running capture worker.
///
/// The source is opened before the worker starts, so `start` either returns a
/// live session or `SourceUnavailable` with nothing left running.
pub struct CaptureSession {
    id: u64,
    source_id: String,
    cancel: CancellationToken,
    done: Receiver<()>,
    finished: bool,
    join: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl CaptureSession {
    pub fn start(id: u64, source_id: &str, ctx: CaptureContext) -> Result<Self, PipelineError> {
        let source = ingest::open_source(source_id)?;
        log::info!("session {} opened {}", id, source.describe());

        let detect = DetectionWorker::spawn(&format!("session-{}", id), ctx.detect_timeout)
            .map_err(|e| PipelineError::source_unavailable(source_id, format!("{:#}", e)))?;

        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let (done_tx, done_rx) = mpsc::channel();

        let published = ctx.published.clone();
        published.claim(id);
        let worker = CaptureWorker {
            id,
            ctx,
            cancel: cancel.clone(),
            counters: counters.clone(),
            detect,
        };
        let join = std::thread::Builder::new()
            .name(format!("capture-{}", id))
            .spawn(move || {
                let _exit = ExitSignal(done_tx);
                let mut source = SourceGuard(source);
                worker.run(&mut source);
            });
        let join = match join {
            Ok(join) => join,
            // The closure (and with it the source guard) is dropped here, closing the source.
            Err(e) => {
                published.release(id);
                return Err(PipelineError::source_unavailable(source_id, e));
            }
        };

        Ok(Self {
            id,
            source_id: source_id.to_string(),
            cancel,
            done: done_rx,
            finished: false,
            join: Some(join),
            counters,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// True once the worker has exited, for whatever reason.
    pub fn is_finished(&mut self) -> bool {
        if !self.finished {
            match self.done.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => self.finished = true,
                Err(mpsc::TryRecvError::Empty) => {}
            }
        }
        self.finished
    }

    /// Wait up to `timeout` for the worker to exit, then join it.
    pub fn wait(&mut self, timeout: Duration) -> Result<(), PipelineError> {
        if !self.finished {
            match self.done.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => self.finished = true,
                Err(RecvTimeoutError::Timeout) => return Err(PipelineError::ShutdownTimeout(timeout)),
            }
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("capture worker for session {} panicked", self.id);
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.id,
            source: self.source_id.clone(),
            frames_read: self.counters.frames_read.load(Ordering::Relaxed),
            frames_processed: self.counters.frames_processed.load(Ordering::Relaxed),
            detection_failures: self.counters.detection_failures.load(Ordering::Relaxed),
            fps: f64::from_bits(self.counters.fps_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Closes the source on every exit path, including unwinding.
struct SourceGuard(Box<dyn FrameSource>);

impl Drop for SourceGuard {
    fn drop(&mut self) {
        let stats = self.0.stats();
        self.0.close();
        log::info!(
            "closed {} after {} frame(s)",
            stats.source,
            stats.frames_read
        );
    }
}

/// Signals the supervisor after the source guard has been dropped.
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

struct CaptureWorker {
    id: u64,
    ctx: CaptureContext,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    detect: DetectionWorker,
}

impl CaptureWorker {
    fn run(self, source: &mut SourceGuard) {
        let skip = u64::from(self.ctx.frame_skip.max(1));
        let mut read = 0u64;
        let mut last_processed: Option<Instant> = None;

        loop {
            if self.cancel.is_cancelled() {
                log::info!("session {} stopping on request", self.id);
                break;
            }
            let frame = match source.0.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("session {}: end of stream", self.id);
                    break;
                }
                Err(err) => {
                    log::warn!("session {}: read failed, ending session: {:#}", self.id, err);
                    break;
                }
            };
            read += 1;
            self.counters.frames_read.fetch_add(1, Ordering::Relaxed);
            if (read - 1) % skip != 0 {
                continue;
            }

            let frame = match frame::normalize(frame, self.ctx.width, self.ctx.height) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("session {}: dropping frame: {:#}", self.id, err);
                    continue;
                }
            };
            let now = Instant::now();
            let fps = last_processed
                .map(|prev| now.duration_since(prev).as_secs_f64())
                .filter(|dt| *dt > 0.0)
                .map(|dt| 1.0 / dt)
                .unwrap_or(0.0);
            last_processed = Some(now);
            self.process(frame, fps);
        }

        self.detect.shutdown(DETECT_SHUTDOWN_GRACE);
    }

    fn process(&self, frame: Frame, fps: f64) {
        let frame = Arc::new(frame);
        let model = self.ctx.detector.current();
        let detections = match self.detect.detect(model, frame.clone()) {
            Ok(detections) => detections,
            Err(err) => {
                let failures = self.counters.detection_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
                    log::warn!("session {}: {} ({} so far)", self.id, err, failures);
                }
                Vec::new()
            }
        };
        let summary = DetectionSummary::from_detections(&detections);
        let metrics = OverlayMetrics {
            fps,
            vision_confidence: summary.average_fire_confidence,
            sensor_confidence: self.ctx.sensor_cache.get(),
        };
        // A timed-out detector may still hold its clone of the frame.
        let frame = Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone());
        let annotated = annotate(frame, &detections, &metrics);
        if self.ctx.published.publish(self.id, annotated, summary).is_some() {
            self.counters.frames_processed.fetch_add(1, Ordering::Relaxed);
            self.counters.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        }
    }
}
