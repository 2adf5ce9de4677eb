//! Detection worker thread.
//!
//! Each capture session owns one worker. Jobs are handed over through a
//! single-slot channel and answered on a per-job reply channel, so a detector
//! that hangs costs the capture loop at most `timeout` per frame; while the hung
//! call is still running further frames are reported as failures immediately.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::registry::LoadedModel;
use crate::detect::result::Detection;
use crate::error::PipelineError;
use crate::frame::Frame;

struct DetectJob {
    model: Arc<LoadedModel>,
    frame: Arc<Frame>,
    reply: mpsc::Sender<Result<Vec<Detection>>>,
}

pub struct DetectionWorker {
    jobs: Option<SyncSender<DetectJob>>,
    exited: Receiver<()>,
    join: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl DetectionWorker {
    pub fn spawn(name: &str, timeout: Duration) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::sync_channel::<DetectJob>(1);
        let (exited_tx, exited_rx) = mpsc::channel::<()>();
        let join = std::thread::Builder::new()
            .name(format!("{}-detect", name))
            .spawn(move || {
                run_worker(jobs_rx);
                let _ = exited_tx.send(());
            })?;
        Ok(Self {
            jobs: Some(jobs_tx),
            exited: exited_rx,
            join: Some(join),
            timeout,
        })
    }

    /// Run `model` on `frame`, waiting at most the configured timeout.
    pub fn detect(
        &self,
        model: Arc<LoadedModel>,
        frame: Arc<Frame>,
    ) -> Result<Vec<Detection>, PipelineError> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| PipelineError::DetectionFailure("detection worker stopped".into()))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        let job = DetectJob {
            model,
            frame,
            reply: reply_tx,
        };
        match jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(PipelineError::DetectionFailure(
                    "detector still busy with a previous frame".into(),
                ))
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(PipelineError::DetectionFailure(
                    "detection worker exited".into(),
                ))
            }
        }
        match reply_rx.recv_timeout(self.timeout) {
            Ok(Ok(detections)) => Ok(detections),
            Ok(Err(err)) => Err(PipelineError::DetectionFailure(format!("{:#}", err))),
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::DetectionFailure(format!(
                "detector did not answer within {:?}",
                self.timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::DetectionFailure(
                "detection worker dropped the job".into(),
            )),
        }
    }

    /// Close the job queue and wait up to `grace` for the worker to finish.
    ///
    /// A worker stuck inside a detector call is detached rather than joined.
    pub fn shutdown(mut self, grace: Duration) {
        self.jobs.take();
        match self.exited.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(join) = self.join.take() {
                    let _ = join.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("detection worker still busy after {:?}; detaching", grace);
                self.join.take();
            }
        }
    }
}

fn run_worker(jobs: Receiver<DetectJob>) {
    for job in jobs {
        let DetectJob {
            model,
            frame,
            reply,
        } = job;
        let result = panic::catch_unwind(AssertUnwindSafe(|| model.detect(&frame)))
            .unwrap_or_else(|_| Err(anyhow!("detector '{}' panicked", model.id)));
        // The capture loop may have given up on this job already.
        let _ = reply.send(result);
    }
}
