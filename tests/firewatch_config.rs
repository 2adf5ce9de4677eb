use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use firewatch::config::{FirewatchConfig, SensorKind, TransportKind, EMERGENCY_CHANNEL, SOFT_CHANNEL};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FIREWATCH_CONFIG",
        "FIREWATCH_API_ADDR",
        "FIREWATCH_FRAME_SKIP",
        "FIREWATCH_DEFAULT_SOURCE",
        "FIREWATCH_DEFAULT_MODEL",
        "FIREWATCH_DETECT_TIMEOUT_MS",
        "FIREWATCH_SENSOR_KIND",
        "FIREWATCH_SENSOR_PATH",
        "FIREWATCH_SENSOR_URL",
        "FIREWATCH_VISION_THRESHOLD",
        "FIREWATCH_SENSOR_THRESHOLD",
        "FIREWATCH_ADJUSTED_THRESHOLD",
        "FIREWATCH_SOFT_COOLDOWN_SECS",
        "FIREWATCH_EMERGENCY_COOLDOWN_SECS",
        "FIREWATCH_LOCATION",
        "FIREWATCH_TWILIO_ACCOUNT_SID",
        "FIREWATCH_TWILIO_AUTH_TOKEN",
        "FIREWATCH_TWILIO_SMS_FROM",
        "FIREWATCH_TWILIO_WHATSAPP_FROM",
        "FIREWATCH_SOFT_RECIPIENTS",
        "FIREWATCH_EMERGENCY_RECIPIENTS",
        "FIREWATCH_JOIN_TIMEOUT_MS",
        "FIREWATCH_STATUS_POLL_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FirewatchConfig::load().expect("load defaults");
    assert_eq!(cfg.api_addr, "0.0.0.0:5000");
    assert_eq!(cfg.capture.frame_skip, 2);
    assert_eq!((cfg.capture.width, cfg.capture.height), (640, 360));
    assert_eq!(cfg.detector.default_model, "demo");
    assert_eq!(cfg.alerts.vision_threshold, 70.0);
    assert_eq!(cfg.alerts.sensor_threshold, 70.0);
    assert_eq!(cfg.alerts.adjusted_threshold, 80.0);
    assert_eq!(cfg.alerts.soft_cooldown, Duration::from_secs(300));
    assert_eq!(cfg.alerts.emergency_cooldown, Duration::from_secs(600));
    assert_eq!(cfg.alerts.location, "Unknown");
    assert_eq!(cfg.sensor.kind, SensorKind::None);
    assert!(cfg.status_poll_interval.is_none());
    assert_eq!(cfg.notify.channels[SOFT_CHANNEL].transport, TransportKind::Log);
    assert_eq!(cfg.notify.channels[EMERGENCY_CHANNEL].transport, TransportKind::Log);

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api": { "addr": "127.0.0.1:5050" },
        "capture": { "frame_skip": 3, "default_source": "stub://lobby" },
        "detector": {
            "default_model": "hall",
            "models": [
                { "id": "hall", "class_map": { "0": "fire", "1": "smoke" } },
                { "id": "garage", "class_map": { "0": "smoke", "1": "fire" } }
            ]
        },
        "sensor": {
            "kind": "static",
            "reading": { "co": 0.001, "humidity": 45.0, "lpg": 0.0, "smoke": 0.0, "temp": 22.5 }
        },
        "alerts": { "location": "Warehouse 7", "soft_cooldown_secs": 60 },
        "status": { "poll_interval_secs": 15 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("FIREWATCH_CONFIG", file.path());
    std::env::set_var("FIREWATCH_DEFAULT_MODEL", "garage");
    std::env::set_var("FIREWATCH_ADJUSTED_THRESHOLD", "85");
    std::env::set_var("FIREWATCH_EMERGENCY_COOLDOWN_SECS", "900");

    let cfg = FirewatchConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:5050");
    assert_eq!(cfg.capture.frame_skip, 3);
    assert_eq!(cfg.capture.default_source.as_deref(), Some("stub://lobby"));
    assert_eq!(cfg.detector.default_model, "garage");
    assert_eq!(cfg.detector.models.len(), 2);
    assert_eq!(cfg.sensor.kind, SensorKind::Static);
    let reading = cfg.sensor.reading.expect("static reading");
    assert_eq!(reading.temperature, 22.5);
    assert_eq!(cfg.alerts.location, "Warehouse 7");
    assert_eq!(cfg.alerts.soft_cooldown, Duration::from_secs(60));
    assert_eq!(cfg.alerts.emergency_cooldown, Duration::from_secs(900));
    assert_eq!(cfg.alerts.adjusted_threshold, 85.0);
    assert_eq!(cfg.status_poll_interval, Some(Duration::from_secs(15)));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[capture]
frame_skip = 1

[alerts]
vision_threshold = 60.0
location = "Server room"

[stream]
jpeg_quality = 70
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("FIREWATCH_CONFIG", file.path());

    let cfg = FirewatchConfig::load().expect("load toml config");
    assert_eq!(cfg.capture.frame_skip, 1);
    assert_eq!(cfg.alerts.vision_threshold, 60.0);
    assert_eq!(cfg.alerts.location, "Server room");
    assert_eq!(cfg.stream.jpeg_quality, 70);
    assert_eq!(cfg.detector.default_model, "demo");

    clear_env();
}

#[test]
fn twilio_credentials_and_recipients_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "notify": {
            "channels": {
                "soft-broadcast": { "transport": "whatsapp" },
                "emergency": { "transport": "sms" }
            }
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("FIREWATCH_CONFIG", file.path());
    std::env::set_var("FIREWATCH_TWILIO_ACCOUNT_SID", "AC123");
    std::env::set_var("FIREWATCH_TWILIO_AUTH_TOKEN", "secret-token");
    std::env::set_var("FIREWATCH_TWILIO_SMS_FROM", "+15550001111");
    std::env::set_var("FIREWATCH_TWILIO_WHATSAPP_FROM", "+15550002222");
    std::env::set_var("FIREWATCH_SOFT_RECIPIENTS", "+15551112222, +15553334444");
    std::env::set_var("FIREWATCH_EMERGENCY_RECIPIENTS", "+15559990000");

    let cfg = FirewatchConfig::load().expect("load config");
    let twilio = cfg.notify.twilio.as_ref().expect("twilio settings");
    assert_eq!(twilio.account_sid, "AC123");
    assert_eq!(twilio.sms_from.as_deref(), Some("+15550001111"));
    assert!(!format!("{:?}", twilio).contains("secret-token"));
    assert_eq!(
        cfg.notify.channels[SOFT_CHANNEL].recipients,
        vec!["+15551112222".to_string(), "+15553334444".to_string()]
    );
    assert_eq!(
        cfg.notify.channels[EMERGENCY_CHANNEL].recipients,
        vec!["+15559990000".to_string()]
    );

    clear_env();
}

#[test]
fn sms_channel_without_credentials_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "notify": {
            "channels": {
                "emergency": { "transport": "sms", "recipients": ["+15559990000"] }
            }
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");
    std::env::set_var("FIREWATCH_CONFIG", file.path());

    assert!(FirewatchConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_out_of_range_threshold() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FIREWATCH_VISION_THRESHOLD", "140");
    assert!(FirewatchConfig::load().is_err());

    std::env::set_var("FIREWATCH_VISION_THRESHOLD", "not-a-number");
    assert!(FirewatchConfig::load().is_err());

    clear_env();
}
