//! Cooldown-gated alert dispatch.
//!
//! Each (metric, channel) pair is a small state machine: armed until a send
//! succeeds, then cooling until its cooldown elapses. The pair's lock is held
//! across decide, send and stamp, so two concurrent ticks cannot both send.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{AlertSettings, EMERGENCY_CHANNEL, SOFT_CHANNEL};
use crate::fusion::ConfidenceScores;
use crate::notify::Notifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMetric {
    Vision,
    Sensor,
    Adjusted,
}

impl AlertMetric {
    fn value(&self, scores: &ConfidenceScores) -> f64 {
        match self {
            AlertMetric::Vision => scores.vision_confidence,
            AlertMetric::Sensor => scores.sensor_confidence,
            AlertMetric::Adjusted => scores.adjusted_confidence,
        }
    }

    fn message(&self, value: f64, location: &str) -> String {
        match self {
            AlertMetric::Vision => format!(
                "WARNING: Camera detected high fire confidence ({:.1}%) at {}. Please check the system.",
                value, location
            ),
            AlertMetric::Sensor => format!(
                "WARNING: Abnormal sensor readings detected ({:.1}%) at {}. Please check the environment.",
                value, location
            ),
            AlertMetric::Adjusted => format!(
                "EMERGENCY ALERT: Fire detected with high confidence ({:.1}%) at {}. Immediate action required!",
                value, location
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AlertRule {
    pub metric: AlertMetric,
    pub channel: String,
    pub threshold: f64,
    pub cooldown: Duration,
}

impl AlertRule {
    /// The three standard rules: vision and sensor on the soft channel, the
    /// fused score on the emergency channel.
    pub fn standard(settings: &AlertSettings) -> Vec<AlertRule> {
        vec![
            AlertRule {
                metric: AlertMetric::Vision,
                channel: SOFT_CHANNEL.to_string(),
                threshold: settings.vision_threshold,
                cooldown: settings.soft_cooldown,
            },
            AlertRule {
                metric: AlertMetric::Sensor,
                channel: SOFT_CHANNEL.to_string(),
                threshold: settings.sensor_threshold,
                cooldown: settings.soft_cooldown,
            },
            AlertRule {
                metric: AlertMetric::Adjusted,
                channel: EMERGENCY_CHANNEL.to_string(),
                threshold: settings.adjusted_threshold,
                cooldown: settings.emergency_cooldown,
            },
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlertOutcome {
    BelowThreshold,
    Sent,
    Suppressed { remaining_secs: u64 },
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct AlertReport {
    pub metric: AlertMetric,
    pub channel: String,
    pub value: f64,
    #[serde(flatten)]
    pub outcome: AlertOutcome,
}

struct ChannelState {
    rule: AlertRule,
    last_fired_at: Mutex<Option<Instant>>,
}

pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    channels: Vec<ChannelState>,
    location: String,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, settings: &AlertSettings) -> Self {
        Self::with_rules(notifier, AlertRule::standard(settings), &settings.location)
    }

    pub fn with_rules(notifier: Arc<dyn Notifier>, rules: Vec<AlertRule>, location: &str) -> Self {
        let channels = rules
            .into_iter()
            .map(|rule| ChannelState {
                rule,
                last_fired_at: Mutex::new(None),
            })
            .collect();
        Self {
            notifier,
            channels,
            location: location.to_string(),
        }
    }

    pub fn evaluate(&self, scores: &ConfidenceScores) -> Vec<AlertReport> {
        self.evaluate_at(scores, Instant::now())
    }

    /// Evaluate every rule against `scores` as of `now`.
    pub fn evaluate_at(&self, scores: &ConfidenceScores, now: Instant) -> Vec<AlertReport> {
        self.channels
            .iter()
            .map(|state| {
                let value = state.rule.metric.value(scores);
                AlertReport {
                    metric: state.rule.metric,
                    channel: state.rule.channel.clone(),
                    value,
                    outcome: self.tick(state, value, now),
                }
            })
            .collect()
    }

    fn tick(&self, state: &ChannelState, value: f64, now: Instant) -> AlertOutcome {
        let rule = &state.rule;
        if value < rule.threshold {
            return AlertOutcome::BelowThreshold;
        }
        let mut last_fired_at = state
            .last_fired_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(fired) = *last_fired_at {
            let elapsed = now.saturating_duration_since(fired);
            if elapsed < rule.cooldown {
                let remaining = rule.cooldown - elapsed;
                log::debug!(
                    "{:?} alert on '{}' cooling down ({}s left)",
                    rule.metric,
                    rule.channel,
                    remaining.as_secs()
                );
                return AlertOutcome::Suppressed {
                    remaining_secs: remaining.as_secs(),
                };
            }
        }
        let message = rule.metric.message(value, &self.location);
        match self.notifier.send(&rule.channel, &message) {
            Ok(()) => {
                *last_fired_at = Some(now);
                log::info!("{:?} alert sent on '{}' ({:.1}%)", rule.metric, rule.channel, value);
                AlertOutcome::Sent
            }
            Err(err) => {
                log::warn!("{:?} alert on '{}' not delivered: {}", rule.metric, rule.channel, err);
                AlertOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::fusion::fuse;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        failing: AtomicBool,
    }

    impl Notifier for Recorder {
        fn send(&self, channel: &str, message: &str) -> Result<(), PipelineError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PipelineError::notification(channel, "transport down"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn dispatcher(notifier: Arc<Recorder>) -> AlertDispatcher {
        AlertDispatcher::new(notifier, &AlertSettings::default())
    }

    fn outcome(reports: &[AlertReport], metric: AlertMetric) -> AlertOutcome {
        reports
            .iter()
            .find(|r| r.metric == metric)
            .map(|r| r.outcome.clone())
            .expect("metric evaluated")
    }

    #[test]
    fn messages_carry_location_and_percentage() {
        let recorder = Arc::new(Recorder::default());
        let settings = AlertSettings {
            location: "Warehouse 3".into(),
            ..AlertSettings::default()
        };
        let dispatcher = AlertDispatcher::new(recorder.clone(), &settings);
        dispatcher.evaluate(&fuse(75.0, None));
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SOFT_CHANNEL);
        assert!(sent[0].1.contains("(75.0%) at Warehouse 3"));
    }

    #[test]
    fn failure_does_not_start_cooldown() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(recorder.clone());
        let t0 = Instant::now();
        recorder.failing.store(true, Ordering::SeqCst);
        let first = dispatcher.evaluate_at(&fuse(95.0, Some(95.0)), t0);
        assert!(matches!(
            outcome(&first, AlertMetric::Adjusted),
            AlertOutcome::Failed { .. }
        ));
        recorder.failing.store(false, Ordering::SeqCst);
        let retry = dispatcher.evaluate_at(&fuse(95.0, Some(95.0)), t0 + Duration::from_secs(1));
        assert_eq!(outcome(&retry, AlertMetric::Adjusted), AlertOutcome::Sent);
    }

    #[test]
    fn cooldown_expires() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(recorder.clone());
        let t0 = Instant::now();
        let scores = fuse(75.0, None);
        dispatcher.evaluate_at(&scores, t0);
        let during = dispatcher.evaluate_at(&scores, t0 + Duration::from_secs(299));
        assert_eq!(
            outcome(&during, AlertMetric::Vision),
            AlertOutcome::Suppressed { remaining_secs: 1 }
        );
        let after = dispatcher.evaluate_at(&scores, t0 + Duration::from_secs(300));
        assert_eq!(outcome(&after, AlertMetric::Vision), AlertOutcome::Sent);
        assert_eq!(recorder.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn soft_then_suppressed_then_emergency() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = dispatcher(recorder.clone());
        let t0 = Instant::now();

        let tick1 = dispatcher.evaluate_at(&fuse(75.0, None), t0);
        assert_eq!(outcome(&tick1, AlertMetric::Vision), AlertOutcome::Sent);
        assert_eq!(outcome(&tick1, AlertMetric::Adjusted), AlertOutcome::BelowThreshold);

        let tick2 = dispatcher.evaluate_at(&fuse(80.0, None), t0 + Duration::from_secs(60));
        assert!(matches!(
            outcome(&tick2, AlertMetric::Vision),
            AlertOutcome::Suppressed { .. }
        ));

        let tick3 = dispatcher.evaluate_at(&fuse(90.0, Some(85.0)), t0 + Duration::from_secs(120));
        assert_eq!(outcome(&tick3, AlertMetric::Adjusted), AlertOutcome::Sent);
        assert_eq!(outcome(&tick3, AlertMetric::Sensor), AlertOutcome::Sent);
        assert!(matches!(
            outcome(&tick3, AlertMetric::Vision),
            AlertOutcome::Suppressed { .. }
        ));

        let sent = recorder.sent.lock().unwrap();
        let emergency: Vec<_> = sent.iter().filter(|(c, _)| c == EMERGENCY_CHANNEL).collect();
        assert_eq!(emergency.len(), 1);
        assert!(emergency[0].1.contains("(88.5%)"));
    }

    #[test]
    fn concurrent_ticks_send_once() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Arc::new(dispatcher(recorder.clone()));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || dispatcher.evaluate_at(&fuse(99.0, Some(99.0)), now))
            })
            .collect();
        for handle in handles {
            handle.join().expect("tick thread");
        }
        // One vision, one sensor, one emergency.
        assert_eq!(recorder.sent.lock().unwrap().len(), 3);
    }
}
