//! Alert delivery.
//!
//! `Notifier` is the boundary the alert dispatcher talks to. `RoutedNotifier`
//! maps each named channel to a transport and a recipient list; a channel
//! without a route cannot deliver and every send on it fails.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{NotifySettings, TransportKind};
use crate::error::PipelineError;

mod mqtt;
mod twilio;

pub use mqtt::MqttTransport;
pub use twilio::{TwilioClient, TwilioTransport};

/// Delivers a message over a named channel.
pub trait Notifier: Send + Sync {
    fn send(&self, channel: &str, message: &str) -> Result<(), PipelineError>;
}

/// One way of getting a message out.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver to one recipient. Broadcast transports are called once with `None`.
    fn deliver(&self, channel: &str, recipient: Option<&str>, message: &str) -> Result<()>;
}

/// Writes alerts to the log. Always succeeds.
pub struct LogTransport;

impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, channel: &str, recipient: Option<&str>, message: &str) -> Result<()> {
        match recipient {
            Some(recipient) => log::warn!("[alert:{} -> {}] {}", channel, recipient, message),
            None => log::warn!("[alert:{}] {}", channel, message),
        }
        Ok(())
    }
}

struct Route {
    transport: Arc<dyn Transport>,
    recipients: Vec<String>,
}

#[derive(Default)]
pub struct RoutedNotifier {
    routes: HashMap<String, Route>,
}

impl RoutedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build routes from configuration. Twilio and MQTT clients are shared by
    /// every channel that uses them.
    pub fn from_settings(settings: &NotifySettings) -> Result<Self> {
        let mut notifier = Self::new();
        let mut twilio: Option<Arc<TwilioClient>> = None;
        let mut mqtt: Option<Arc<MqttTransport>> = None;

        let mut names: Vec<&String> = settings.channels.keys().collect();
        names.sort();
        for name in names {
            let channel = &settings.channels[name];
            let transport: Arc<dyn Transport> = match channel.transport {
                TransportKind::Log => Arc::new(LogTransport),
                TransportKind::Sms | TransportKind::Whatsapp => {
                    let client = match &twilio {
                        Some(client) => client.clone(),
                        None => {
                            let creds = settings.twilio.as_ref().ok_or_else(|| {
                                anyhow::anyhow!("channel '{}' needs twilio credentials", name)
                            })?;
                            let client = Arc::new(TwilioClient::new(creds)?);
                            twilio = Some(client.clone());
                            client
                        }
                    };
                    let transport = if channel.transport == TransportKind::Sms {
                        TwilioTransport::sms(client)
                    } else {
                        TwilioTransport::whatsapp(client)
                    };
                    Arc::new(transport)
                }
                TransportKind::Mqtt => match &mqtt {
                    Some(transport) => transport.clone(),
                    None => {
                        let broker = settings.mqtt.as_ref().ok_or_else(|| {
                            anyhow::anyhow!("channel '{}' needs mqtt settings", name)
                        })?;
                        let transport = Arc::new(MqttTransport::connect(broker)?);
                        mqtt = Some(transport.clone());
                        transport
                    }
                },
            };
            log::info!(
                "alert channel '{}' -> {} ({} recipient(s))",
                name,
                transport.name(),
                channel.recipients.len()
            );
            notifier.route(name, transport, channel.recipients.clone());
        }
        Ok(notifier)
    }

    pub fn route(&mut self, channel: &str, transport: Arc<dyn Transport>, recipients: Vec<String>) {
        self.routes.insert(
            channel.to_string(),
            Route {
                transport,
                recipients,
            },
        );
    }

    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Notifier for RoutedNotifier {
    /// Succeeds only when every recipient on the channel was reached.
    fn send(&self, channel: &str, message: &str) -> Result<(), PipelineError> {
        let route = self
            .routes
            .get(channel)
            .ok_or_else(|| PipelineError::notification(channel, "channel not configured"))?;

        if route.recipients.is_empty() {
            return route
                .transport
                .deliver(channel, None, message)
                .map_err(|e| PipelineError::notification(channel, format!("{:#}", e)));
        }

        let mut failures = Vec::new();
        for recipient in &route.recipients {
            match route.transport.deliver(channel, Some(recipient), message) {
                Ok(()) => log::info!("alert on '{}' delivered to {}", channel, recipient),
                Err(err) => {
                    log::warn!("alert on '{}' to {} failed: {:#}", channel, recipient, err);
                    failures.push(recipient.as_str());
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::notification(
                channel,
                format!(
                    "{} of {} recipient(s) failed: {}",
                    failures.len(),
                    route.recipients.len(),
                    failures.join(", ")
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Option<String>)>>,
        reject: Option<String>,
    }

    impl Transport for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn deliver(&self, channel: &str, recipient: Option<&str>, _message: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((channel.to_string(), recipient.map(str::to_string)));
            if recipient.is_some() && recipient == self.reject.as_deref() {
                anyhow::bail!("rejected");
            }
            Ok(())
        }
    }

    #[test]
    fn unrouted_channel_fails() {
        let notifier = RoutedNotifier::new();
        let err = notifier.send("emergency", "hi").unwrap_err();
        assert!(matches!(err, PipelineError::NotificationFailure { .. }));
    }

    #[test]
    fn partial_recipient_failure_fails_the_send() {
        let transport = Arc::new(Recording {
            reject: Some("+2".into()),
            ..Recording::default()
        });
        let mut notifier = RoutedNotifier::new();
        notifier.route(
            "soft-broadcast",
            transport.clone(),
            vec!["+1".into(), "+2".into(), "+3".into()],
        );
        assert!(notifier.send("soft-broadcast", "hi").is_err());
        // Remaining recipients are still attempted.
        assert_eq!(transport.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn broadcast_transport_is_called_once() {
        let transport = Arc::new(Recording::default());
        let mut notifier = RoutedNotifier::new();
        notifier.route("emergency", transport.clone(), Vec::new());
        notifier.send("emergency", "hi").expect("send");
        assert_eq!(
            transport.calls.lock().unwrap().as_slice(),
            &[("emergency".to_string(), None)]
        );
    }

    #[test]
    fn default_settings_route_both_channels_to_log() -> Result<()> {
        let cfg = crate::config::FirewatchConfig::defaults();
        let notifier = RoutedNotifier::from_settings(&cfg.notify)?;
        assert_eq!(notifier.channels(), vec!["emergency", "soft-broadcast"]);
        notifier.send("emergency", "test").expect("log transport");
        Ok(())
    }
}
