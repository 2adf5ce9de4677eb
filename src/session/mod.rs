//! Capture session lifecycle.
//!
//! - `CaptureSession`: one source, one worker thread, one detection worker.
//! - `SessionSupervisor`: at most one running session; start/replace/stop.
//! - `SharedPublishedState`: latest annotated frame for viewers and status.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod capture;
mod published;
mod supervisor;

pub use capture::{CaptureContext, CaptureSession, SessionStats};
pub use published::{PublishedFrame, SharedPublishedState};
pub use supervisor::SessionSupervisor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
        }
    }
}

/// Cooperative stop flag, polled once per capture iteration.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
