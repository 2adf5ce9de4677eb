use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::Transport;
use crate::config::MqttSettings;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct AlertPayload<'a> {
    channel: &'a str,
    message: &'a str,
    sent_at: u64,
}

/// Publishes alerts to `<topic_prefix>/alerts/<channel>` with QoS 1.
///
/// Publishing only enqueues; the connection thread owns network I/O and keeps
/// reconnecting until the transport is dropped.
pub struct MqttTransport {
    client: Client,
    topic_prefix: String,
    stop: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        let (client, connection) = Client::new(options, 10);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_connection(connection, stop.clone())?;
        log::info!(
            "mqtt alert transport -> {}:{} (prefix '{}')",
            settings.host,
            settings.port,
            settings.topic_prefix
        );
        Ok(Self {
            client,
            topic_prefix: settings.topic_prefix.trim_end_matches('/').to_string(),
            stop,
            connection_handle: Some(handle),
        })
    }

    fn topic(&self, channel: &str) -> String {
        format!("{}/alerts/{}", self.topic_prefix, channel)
    }
}

fn spawn_connection(mut connection: Connection, stop: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("mqtt-alerts".into())
        .spawn(move || {
            for event in connection.iter() {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        log::warn!("MQTT connection error: {}", e);
                        std::thread::sleep(RECONNECT_BACKOFF);
                    }
                }
            }
        })?;
    Ok(handle)
}

impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn deliver(&self, channel: &str, _recipient: Option<&str>, message: &str) -> Result<()> {
        let sent_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let payload = serde_json::to_vec(&AlertPayload {
            channel,
            message,
            sent_at,
        })?;
        self.client
            .try_publish(self.topic(channel), QoS::AtLeastOnce, false, payload)
            .map_err(|e| anyhow!("mqtt publish failed: {}", e))
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.client.try_disconnect();
        // The connection thread exits on its next event; it is not joined so a
        // dead broker cannot stall shutdown.
        self.connection_handle.take();
    }
}
