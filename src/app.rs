use anyhow::{Context, Result};
use std::sync::Arc;

use crate::alert::AlertDispatcher;
use crate::config::FirewatchConfig;
use crate::detect::{ActiveDetector, ModelRegistry};
use crate::encode::JpegFrameEncoder;
use crate::notify::{Notifier, RoutedNotifier};
use crate::sensor::{open_sensor, SensorCache, ThresholdClassifier};
use crate::session::{CaptureContext, SessionSupervisor, SharedPublishedState};
use crate::status::StatusService;
use crate::stream::StreamBroadcaster;

/// The wired-up pipeline: one of each long-lived component, shared by `Arc`.
pub struct Firewatch {
    pub supervisor: Arc<SessionSupervisor>,
    pub published: Arc<SharedPublishedState>,
    pub broadcaster: Arc<StreamBroadcaster>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub status: Arc<StatusService>,
}

impl Firewatch {
    pub fn from_config(cfg: &FirewatchConfig) -> Result<Self> {
        let notifier =
            RoutedNotifier::from_settings(&cfg.notify).context("configure alert channels")?;
        Self::with_notifier(cfg, Arc::new(notifier))
    }

    pub fn with_notifier(cfg: &FirewatchConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let registry =
            ModelRegistry::from_settings(&cfg.detector.models).context("configure detector models")?;
        let detector = ActiveDetector::new(registry, &cfg.detector.default_model)
            .context("load default detector model")?;
        log::info!(
            "detector '{}' active; available: {}",
            detector.active_id(),
            detector.available().join(", ")
        );

        let published = Arc::new(SharedPublishedState::new());
        let sensor_cache = Arc::new(SensorCache::new());
        let ctx = CaptureContext {
            detector: Arc::new(detector),
            published: published.clone(),
            sensor_cache: sensor_cache.clone(),
            frame_skip: cfg.capture.frame_skip,
            width: cfg.capture.width,
            height: cfg.capture.height,
            detect_timeout: cfg.detector.timeout,
        };
        let supervisor = Arc::new(SessionSupervisor::new(ctx, cfg.session_join_timeout));

        let broadcaster = Arc::new(StreamBroadcaster::new(
            published.clone(),
            Arc::new(JpegFrameEncoder::new(cfg.stream.jpeg_quality)),
            cfg.capture.width,
            cfg.capture.height,
            cfg.stream.placeholder_refresh,
        )?);

        let dispatcher = Arc::new(AlertDispatcher::new(notifier, &cfg.alerts));
        let status = Arc::new(StatusService::new(
            supervisor.clone(),
            published.clone(),
            open_sensor(&cfg.sensor)?,
            Box::new(ThresholdClassifier::default()),
            sensor_cache,
            dispatcher.clone(),
        ));

        Ok(Self {
            supervisor,
            published,
            broadcaster,
            dispatcher,
            status,
        })
    }
}
