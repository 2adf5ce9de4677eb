//! Status evaluation: sensor read, fusion, alert dispatch.
//!
//! Every `/status` request runs one evaluation tick. The optional background
//! poller runs the same tick on a timer so alerts do not depend on someone
//! watching the dashboard.

use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::alert::{AlertDispatcher, AlertReport};
use crate::error::PipelineError;
use crate::fusion::fuse;
use crate::sensor::{SensorCache, SensorClassifier, SensorReading, SensorSource};
use crate::session::{SessionState, SessionStats, SessionSupervisor, SharedPublishedState};

const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub vision_confidence: f64,
    pub sensor_confidence: f64,
    pub adjusted_confidence: f64,
    pub fire_detected: bool,
    pub smoke_detected: bool,
    pub frame_available: bool,
    pub session_state: SessionState,
    pub active_model: String,
    pub active_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_readings: Option<SensorReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub alerts: Vec<AlertReport>,
}

pub struct StatusService {
    supervisor: Arc<SessionSupervisor>,
    published: Arc<SharedPublishedState>,
    sensor: Box<dyn SensorSource>,
    classifier: Box<dyn SensorClassifier>,
    sensor_cache: Arc<SensorCache>,
    dispatcher: Arc<AlertDispatcher>,
}

impl StatusService {
    pub fn new(
        supervisor: Arc<SessionSupervisor>,
        published: Arc<SharedPublishedState>,
        sensor: Box<dyn SensorSource>,
        classifier: Box<dyn SensorClassifier>,
        sensor_cache: Arc<SensorCache>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            supervisor,
            published,
            sensor,
            classifier,
            sensor_cache,
            dispatcher,
        }
    }

    /// Run one evaluation tick and report the result.
    pub fn status(&self) -> StatusReport {
        let latest = self.published.latest();
        let summary = latest
            .as_ref()
            .map(|published| published.summary)
            .unwrap_or_default();

        let (reading, error) = match self.sensor.latest() {
            Ok(Some(reading)) => (Some(reading), None),
            Ok(None) => (
                None,
                Some(PipelineError::SensorUnavailable(format!(
                    "no reading from {}",
                    self.sensor.describe()
                ))),
            ),
            Err(err) => (
                None,
                Some(PipelineError::SensorUnavailable(format!("{:#}", err))),
            ),
        };
        if let Some(err) = &error {
            log::debug!("{}", err);
        }
        let sensor_confidence = reading.map(|reading| self.classifier.predict(&reading) * 100.0);
        self.sensor_cache.set(sensor_confidence);

        let scores = fuse(summary.average_fire_confidence, sensor_confidence);
        let alerts = self.dispatcher.evaluate(&scores);

        StatusReport {
            vision_confidence: scores.vision_confidence,
            sensor_confidence: scores.sensor_confidence,
            adjusted_confidence: scores.adjusted_confidence,
            fire_detected: summary.fire_detected,
            smoke_detected: summary.smoke_detected,
            frame_available: latest.is_some(),
            session_state: self.supervisor.state(),
            active_model: self.supervisor.active_model(),
            active_source: self.supervisor.active_source(),
            session: self.supervisor.stats(),
            sensor_readings: reading,
            error: error.map(|err| err.to_string()),
            alerts,
        }
    }

    /// Evaluate every `interval` on a background thread until `stop` is set.
    pub fn spawn_poller(
        self: &Arc<Self>,
        interval: Duration,
        stop: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let service = self.clone();
        let handle = std::thread::Builder::new()
            .name("status-poller".into())
            .spawn(move || {
                log::info!("status poller running every {:?}", interval);
                while !stop.load(Ordering::SeqCst) {
                    let report = service.status();
                    log::debug!(
                        "poll: vision {:.1} sensor {:.1} adjusted {:.1}",
                        report.vision_confidence,
                        report.sensor_confidence,
                        report.adjusted_confidence
                    );
                    let next = Instant::now() + interval;
                    while !stop.load(Ordering::SeqCst) && Instant::now() < next {
                        std::thread::sleep(POLL_SLICE.min(next.saturating_duration_since(Instant::now())));
                    }
                }
            })?;
        Ok(handle)
    }
}
