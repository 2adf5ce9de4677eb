use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{BoundingBox, RawDetection};
use crate::sensor::SensorReading;

const DEFAULT_API_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_FRAME_SKIP: u32 = 2;
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SENSOR_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_VISION_THRESHOLD: f64 = 70.0;
const DEFAULT_SENSOR_THRESHOLD: f64 = 70.0;
const DEFAULT_ADJUSTED_THRESHOLD: f64 = 80.0;
const DEFAULT_SOFT_COOLDOWN_SECS: u64 = 300;
const DEFAULT_EMERGENCY_COOLDOWN_SECS: u64 = 600;
const DEFAULT_LOCATION: &str = "Unknown";
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 0;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_PLACEHOLDER_REFRESH_MS: u64 = 1_000;
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_CLIENT_ID: &str = "firewatchd";
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "firewatch";
const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";
const DEFAULT_MODEL_ID: &str = "demo";

pub const SOFT_CHANNEL: &str = "soft-broadcast";
pub const EMERGENCY_CHANNEL: &str = "emergency";

#[derive(Debug, Deserialize, Default)]
struct FirewatchConfigFile {
    api: Option<ApiConfigFile>,
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    sensor: Option<SensorConfigFile>,
    alerts: Option<AlertsConfigFile>,
    notify: Option<NotifyConfigFile>,
    session: Option<SessionConfigFile>,
    status: Option<StatusConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    frame_skip: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    default_source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    default_model: Option<String>,
    timeout_ms: Option<u64>,
    models: Option<Vec<ModelSettings>>,
}

#[derive(Debug, Deserialize, Default)]
struct SensorConfigFile {
    kind: Option<SensorKind>,
    path: Option<PathBuf>,
    url: Option<String>,
    reading: Option<SensorReading>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    vision_threshold: Option<f64>,
    sensor_threshold: Option<f64>,
    adjusted_threshold: Option<f64>,
    soft_cooldown_secs: Option<u64>,
    emergency_cooldown_secs: Option<u64>,
    location: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    twilio: Option<TwilioSettings>,
    mqtt: Option<MqttConfigFile>,
    channels: Option<HashMap<String, ChannelSettings>>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    host: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    join_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StatusConfigFile {
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
    placeholder_refresh_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FirewatchConfig {
    pub api_addr: String,
    pub capture: CaptureSettings,
    pub detector: DetectorSettings,
    pub sensor: SensorSettings,
    pub alerts: AlertSettings,
    pub notify: NotifySettings,
    pub session_join_timeout: Duration,
    /// `None` disables the background status poller.
    pub status_poll_interval: Option<Duration>,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub frame_skip: u32,
    pub width: u32,
    pub height: u32,
    pub default_source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub default_model: String,
    pub timeout: Duration,
    pub models: Vec<ModelSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Scripted,
    Tract,
}

/// One detector model definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub id: String,
    pub backend: BackendKind,
    pub path: Option<PathBuf>,
    /// Raw class id (as a string key) to label, e.g. `{"0": "fire", "1": "smoke"}`.
    pub class_map: HashMap<String, String>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    /// Detections replayed by the scripted backend.
    pub detections: Vec<RawDetection>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            backend: BackendKind::Scripted,
            path: None,
            class_map: HashMap::new(),
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.25,
            detections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    None,
    Static,
    File,
    Http,
}

impl std::str::FromStr for SensorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SensorKind::None),
            "static" => Ok(SensorKind::Static),
            "file" => Ok(SensorKind::File),
            "http" => Ok(SensorKind::Http),
            other => Err(anyhow!("unknown sensor kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub kind: SensorKind,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub reading: Option<SensorReading>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub vision_threshold: f64,
    pub sensor_threshold: f64,
    pub adjusted_threshold: f64,
    pub soft_cooldown: Duration,
    pub emergency_cooldown: Duration,
    pub location: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            vision_threshold: DEFAULT_VISION_THRESHOLD,
            sensor_threshold: DEFAULT_SENSOR_THRESHOLD,
            adjusted_threshold: DEFAULT_ADJUSTED_THRESHOLD,
            soft_cooldown: Duration::from_secs(DEFAULT_SOFT_COOLDOWN_SECS),
            emergency_cooldown: Duration::from_secs(DEFAULT_EMERGENCY_COOLDOWN_SECS),
            location: DEFAULT_LOCATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    pub twilio: Option<TwilioSettings>,
    pub mqtt: Option<MqttSettings>,
    pub channels: HashMap<String, ChannelSettings>,
}

#[derive(Clone, Deserialize)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number for `sms` channels.
    #[serde(default)]
    pub sms_from: Option<String>,
    /// Sender number for `whatsapp` channels, without the `whatsapp:` prefix.
    #[serde(default)]
    pub whatsapp_from: Option<String>,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

impl std::fmt::Debug for TwilioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSettings")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("sms_from", &self.sms_from)
            .field("whatsapp_from", &self.whatsapp_from)
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn default_twilio_api_base() -> String {
    DEFAULT_TWILIO_API_BASE.to_string()
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Sms,
    Whatsapp,
    Mqtt,
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    pub transport: TransportKind,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    /// How often an idle viewer is re-sent the current image.
    pub placeholder_refresh: Duration,
}

impl FirewatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = env_nonempty("FIREWATCH_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like [`FirewatchConfig::load`], with the file path given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in defaults without consulting the environment.
    pub fn defaults() -> Self {
        Self::from_file(FirewatchConfigFile::default())
    }

    fn from_file(file: FirewatchConfigFile) -> Self {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let capture = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            frame_skip: capture.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            width: capture.width.unwrap_or(crate::frame::CANONICAL_WIDTH),
            height: capture.height.unwrap_or(crate::frame::CANONICAL_HEIGHT),
            default_source: capture.default_source,
        };

        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            default_model: detector
                .default_model
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            timeout: Duration::from_millis(detector.timeout_ms.unwrap_or(DEFAULT_DETECT_TIMEOUT_MS)),
            models: detector.models.unwrap_or_else(demo_models),
        };

        let sensor = file.sensor.unwrap_or_default();
        let sensor = SensorSettings {
            kind: sensor.kind.unwrap_or(SensorKind::None),
            path: sensor.path,
            url: sensor.url,
            reading: sensor.reading,
            timeout: Duration::from_millis(sensor.timeout_ms.unwrap_or(DEFAULT_SENSOR_TIMEOUT_MS)),
        };

        let alerts = file.alerts.unwrap_or_default();
        let alerts = AlertSettings {
            vision_threshold: alerts.vision_threshold.unwrap_or(DEFAULT_VISION_THRESHOLD),
            sensor_threshold: alerts.sensor_threshold.unwrap_or(DEFAULT_SENSOR_THRESHOLD),
            adjusted_threshold: alerts
                .adjusted_threshold
                .unwrap_or(DEFAULT_ADJUSTED_THRESHOLD),
            soft_cooldown: Duration::from_secs(
                alerts
                    .soft_cooldown_secs
                    .unwrap_or(DEFAULT_SOFT_COOLDOWN_SECS),
            ),
            emergency_cooldown: Duration::from_secs(
                alerts
                    .emergency_cooldown_secs
                    .unwrap_or(DEFAULT_EMERGENCY_COOLDOWN_SECS),
            ),
            location: alerts
                .location
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        };

        let notify = file.notify.unwrap_or_default();
        let notify = NotifySettings {
            twilio: notify.twilio,
            mqtt: notify.mqtt.and_then(|mqtt| {
                mqtt.host.map(|host| MqttSettings {
                    host,
                    port: mqtt.port.unwrap_or(DEFAULT_MQTT_PORT),
                    client_id: mqtt
                        .client_id
                        .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
                    topic_prefix: mqtt
                        .topic_prefix
                        .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
                })
            }),
            channels: notify.channels.unwrap_or_else(log_channels),
        };

        let session_join_timeout = Duration::from_millis(
            file.session
                .and_then(|session| session.join_timeout_ms)
                .unwrap_or(DEFAULT_JOIN_TIMEOUT_MS),
        );
        let poll_secs = file
            .status
            .and_then(|status| status.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let stream = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            jpeg_quality: stream.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            placeholder_refresh: Duration::from_millis(
                stream
                    .placeholder_refresh_ms
                    .unwrap_or(DEFAULT_PLACEHOLDER_REFRESH_MS),
            ),
        };

        Self {
            api_addr,
            capture,
            detector,
            sensor,
            alerts,
            notify,
            session_join_timeout,
            status_poll_interval: poll_interval(poll_secs),
            stream,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_nonempty("FIREWATCH_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(skip) = env_nonempty("FIREWATCH_FRAME_SKIP") {
            self.capture.frame_skip = skip
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_FRAME_SKIP must be a positive integer"))?;
        }
        if let Some(source) = env_nonempty("FIREWATCH_DEFAULT_SOURCE") {
            self.capture.default_source = Some(source);
        }
        if let Some(model) = env_nonempty("FIREWATCH_DEFAULT_MODEL") {
            self.detector.default_model = model;
        }
        if let Some(ms) = env_nonempty("FIREWATCH_DETECT_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_DETECT_TIMEOUT_MS must be an integer"))?;
            self.detector.timeout = Duration::from_millis(ms);
        }
        if let Some(kind) = env_nonempty("FIREWATCH_SENSOR_KIND") {
            self.sensor.kind = kind.parse()?;
        }
        if let Some(path) = env_nonempty("FIREWATCH_SENSOR_PATH") {
            self.sensor.path = Some(PathBuf::from(path));
        }
        if let Some(url) = env_nonempty("FIREWATCH_SENSOR_URL") {
            self.sensor.url = Some(url);
        }
        for (key, slot) in [
            ("FIREWATCH_VISION_THRESHOLD", &mut self.alerts.vision_threshold),
            ("FIREWATCH_SENSOR_THRESHOLD", &mut self.alerts.sensor_threshold),
            ("FIREWATCH_ADJUSTED_THRESHOLD", &mut self.alerts.adjusted_threshold),
        ] {
            if let Some(value) = env_nonempty(key) {
                *slot = value
                    .parse()
                    .map_err(|_| anyhow!("{} must be a number", key))?;
            }
        }
        for (key, slot) in [
            ("FIREWATCH_SOFT_COOLDOWN_SECS", &mut self.alerts.soft_cooldown),
            (
                "FIREWATCH_EMERGENCY_COOLDOWN_SECS",
                &mut self.alerts.emergency_cooldown,
            ),
        ] {
            if let Some(value) = env_nonempty(key) {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| anyhow!("{} must be an integer number of seconds", key))?;
                *slot = Duration::from_secs(secs);
            }
        }
        if let Some(location) = env_nonempty("FIREWATCH_LOCATION") {
            self.alerts.location = location;
        }
        if let (Some(sid), Some(token)) = (
            env_nonempty("FIREWATCH_TWILIO_ACCOUNT_SID"),
            env_nonempty("FIREWATCH_TWILIO_AUTH_TOKEN"),
        ) {
            let twilio = self.notify.twilio.get_or_insert_with(|| TwilioSettings {
                account_sid: String::new(),
                auth_token: String::new(),
                sms_from: None,
                whatsapp_from: None,
                api_base: default_twilio_api_base(),
            });
            twilio.account_sid = sid;
            twilio.auth_token = token;
        }
        if let Some(twilio) = self.notify.twilio.as_mut() {
            if let Some(from) = env_nonempty("FIREWATCH_TWILIO_SMS_FROM") {
                twilio.sms_from = Some(from);
            }
            if let Some(from) = env_nonempty("FIREWATCH_TWILIO_WHATSAPP_FROM") {
                twilio.whatsapp_from = Some(from);
            }
        }
        for (key, channel) in [
            ("FIREWATCH_SOFT_RECIPIENTS", SOFT_CHANNEL),
            ("FIREWATCH_EMERGENCY_RECIPIENTS", EMERGENCY_CHANNEL),
        ] {
            if let Ok(value) = std::env::var(key) {
                let recipients = split_csv(&value);
                if !recipients.is_empty() {
                    if let Some(settings) = self.notify.channels.get_mut(channel) {
                        settings.recipients = recipients;
                    }
                }
            }
        }
        if let Some(ms) = env_nonempty("FIREWATCH_JOIN_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_JOIN_TIMEOUT_MS must be an integer"))?;
            self.session_join_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_nonempty("FIREWATCH_STATUS_POLL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_STATUS_POLL_SECS must be an integer"))?;
            self.status_poll_interval = poll_interval(secs);
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.capture.frame_skip == 0 {
            return Err(anyhow!("capture.frame_skip must be at least 1"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.detector.timeout.is_zero() {
            return Err(anyhow!("detector.timeout_ms must be greater than zero"));
        }
        if self.session_join_timeout.is_zero() {
            return Err(anyhow!("session.join_timeout_ms must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for model in &self.detector.models {
            if model.id.trim().is_empty() {
                return Err(anyhow!("detector model ids must not be empty"));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(anyhow!("duplicate detector model id '{}'", model.id));
            }
            if model.class_map.is_empty() {
                return Err(anyhow!("model '{}' must declare a class_map", model.id));
            }
            if model.backend == BackendKind::Tract && model.path.is_none() {
                return Err(anyhow!("model '{}' uses the tract backend without a path", model.id));
            }
        }
        if !seen.contains(self.detector.default_model.as_str()) {
            return Err(anyhow!(
                "default model '{}' is not defined",
                self.detector.default_model
            ));
        }

        match self.sensor.kind {
            SensorKind::File if self.sensor.path.is_none() => {
                return Err(anyhow!("sensor kind 'file' requires sensor.path"))
            }
            SensorKind::Http if self.sensor.url.is_none() => {
                return Err(anyhow!("sensor kind 'http' requires sensor.url"))
            }
            SensorKind::Static if self.sensor.reading.is_none() => {
                return Err(anyhow!("sensor kind 'static' requires sensor.reading"))
            }
            _ => {}
        }

        for (name, value) in [
            ("vision_threshold", self.alerts.vision_threshold),
            ("sensor_threshold", self.alerts.sensor_threshold),
            ("adjusted_threshold", self.alerts.adjusted_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(anyhow!("alerts.{} must be within 0..=100", name));
            }
        }
        self.alerts.location = self.alerts.location.trim().to_string();
        if self.alerts.location.is_empty() {
            self.alerts.location = DEFAULT_LOCATION.to_string();
        }

        for (name, channel) in &self.notify.channels {
            match channel.transport {
                TransportKind::Sms | TransportKind::Whatsapp => {
                    let twilio = self.notify.twilio.as_ref().ok_or_else(|| {
                        anyhow!("channel '{}' needs notify.twilio credentials", name)
                    })?;
                    let from = match channel.transport {
                        TransportKind::Sms => &twilio.sms_from,
                        _ => &twilio.whatsapp_from,
                    };
                    if from.is_none() {
                        return Err(anyhow!("channel '{}' has no sender number configured", name));
                    }
                    if channel.recipients.is_empty() {
                        return Err(anyhow!("channel '{}' has no recipients", name));
                    }
                }
                TransportKind::Mqtt if self.notify.mqtt.is_none() => {
                    return Err(anyhow!("channel '{}' needs notify.mqtt settings", name));
                }
                _ => {}
            }
        }

        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("stream.jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }
}

/// Demo models shipped in the default configuration. Both replay the same raw
/// detection; they differ only in which class id means fire.
fn demo_models() -> Vec<ModelSettings> {
    let detection = RawDetection {
        bbox: BoundingBox::new(220.0, 110.0, 420.0, 290.0),
        class_id: 0,
        confidence: 0.75,
    };
    vec![
        ModelSettings {
            id: DEFAULT_MODEL_ID.to_string(),
            class_map: class_map(&[("0", "fire"), ("1", "smoke")]),
            detections: vec![detection.clone()],
            ..ModelSettings::default()
        },
        ModelSettings {
            id: "demo-smoke-first".to_string(),
            class_map: class_map(&[("0", "smoke"), ("1", "fire")]),
            detections: vec![detection],
            ..ModelSettings::default()
        },
    ]
}

fn class_map(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(id, label)| (id.to_string(), label.to_string()))
        .collect()
}

fn log_channels() -> HashMap<String, ChannelSettings> {
    [SOFT_CHANNEL, EMERGENCY_CHANNEL]
        .into_iter()
        .map(|name| {
            (
                name.to_string(),
                ChannelSettings {
                    transport: TransportKind::Log,
                    recipients: Vec::new(),
                },
            )
        })
        .collect()
}

fn poll_interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn read_config_file(path: &Path) -> Result<FirewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() -> Result<()> {
        let mut cfg = FirewatchConfig::defaults();
        cfg.validate()?;
        assert_eq!(cfg.capture.frame_skip, 2);
        assert_eq!((cfg.capture.width, cfg.capture.height), (640, 360));
        assert_eq!(cfg.alerts.soft_cooldown, Duration::from_secs(300));
        assert_eq!(cfg.alerts.emergency_cooldown, Duration::from_secs(600));
        assert_eq!(cfg.alerts.location, "Unknown");
        assert!(cfg.status_poll_interval.is_none());
        assert!(cfg.notify.channels.contains_key(SOFT_CHANNEL));
        Ok(())
    }

    #[test]
    fn undefined_default_model_is_rejected() {
        let mut cfg = FirewatchConfig::defaults();
        cfg.detector.default_model = "missing".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sms_channel_requires_twilio() {
        let mut cfg = FirewatchConfig::defaults();
        cfg.notify.channels.insert(
            EMERGENCY_CHANNEL.into(),
            ChannelSettings {
                transport: TransportKind::Sms,
                recipients: vec!["+15550100".into()],
            },
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn blank_location_falls_back() -> Result<()> {
        let mut cfg = FirewatchConfig::defaults();
        cfg.alerts.location = "   ".into();
        cfg.validate()?;
        assert_eq!(cfg.alerts.location, "Unknown");
        Ok(())
    }

    #[test]
    fn split_csv_trims_and_drops_empty() {
        assert_eq!(split_csv(" a, ,b ,"), vec!["a", "b"]);
    }
}
