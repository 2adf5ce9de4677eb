//! Firewatch
//!
//! Fire and smoke detection over live video, fused with environmental sensor
//! readings.
//!
//! # Architecture
//!
//! - `session`: one capture session at a time, reading frames from an `ingest`
//!   source, running the active `detect` model on every Nth frame and
//!   publishing the annotated result.
//! - `stream`: re-serves the latest published frame to any number of viewers.
//! - `status`: on demand (or on a timer) reads the sensor, fuses the vision and
//!   sensor confidences (`fusion`) and hands the scores to `alert`.
//! - `alert`: threshold and cooldown gating in front of the `notify` channels.
//! - `api`: the HTTP surface over all of the above.

pub mod alert;
pub mod annotate;
pub mod api;
pub mod app;
pub mod config;
pub mod detect;
pub mod encode;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod ingest;
pub mod notify;
pub mod sensor;
pub mod session;
pub mod status;
pub mod stream;

pub use alert::{AlertDispatcher, AlertMetric, AlertOutcome, AlertReport, AlertRule};
pub use app::Firewatch;
pub use config::FirewatchConfig;
pub use detect::{ActiveDetector, Detection, DetectionSummary, DetectorBackend, Label, ModelRegistry};
pub use error::PipelineError;
pub use frame::Frame;
pub use fusion::{fuse, ConfidenceScores};
pub use ingest::{open_source, FrameSource};
pub use notify::{Notifier, RoutedNotifier, Transport};
pub use sensor::{SensorClassifier, SensorReading, SensorSource, ThresholdClassifier};
pub use session::{SessionState, SessionSupervisor, SharedPublishedState};
pub use status::{StatusReport, StatusService};
pub use stream::StreamBroadcaster;
