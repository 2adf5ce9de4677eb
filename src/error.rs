use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for the capture, detection and alerting pipeline.
///
/// Only `SourceUnavailable`, `UnknownModel`, `ModelLoad` and `ShutdownTimeout`
/// reach operators (as rejected requests). The others are recovered where they
/// occur and only show up in logs or the status report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("video source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("unknown detector model '{0}'")]
    UnknownModel(String),

    #[error("failed to load detector model '{model_id}': {reason}")]
    ModelLoad { model_id: String, reason: String },

    #[error("detection failed: {0}")]
    DetectionFailure(String),

    #[error("notification on channel '{channel}' failed: {reason}")]
    NotificationFailure { channel: String, reason: String },

    #[error("sensor data unavailable: {0}")]
    SensorUnavailable(String),

    #[error("capture session did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

impl PipelineError {
    pub(crate) fn source_unavailable(source_id: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn notification(channel: &str, reason: impl ToString) -> Self {
        Self::NotificationFailure {
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }
}
