use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::Transport;
use crate::config::TwilioSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Minimal client for the Twilio Messages REST endpoint.
///
/// Credentials travel as URL userinfo, which ureq turns into a basic-auth header.
pub struct TwilioClient {
    agent: ureq::Agent,
    endpoint: Url,
    sms_from: Option<String>,
    whatsapp_from: Option<String>,
}

impl TwilioClient {
    pub fn new(settings: &TwilioSettings) -> Result<Self> {
        if settings.account_sid.trim().is_empty() || settings.auth_token.trim().is_empty() {
            return Err(anyhow!("twilio account_sid and auth_token are required"));
        }
        let base = settings.api_base.trim_end_matches('/');
        let mut endpoint = Url::parse(&format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            base, settings.account_sid
        ))
        .with_context(|| format!("invalid twilio api base {}", settings.api_base))?;
        endpoint
            .set_username(&settings.account_sid)
            .map_err(|_| anyhow!("twilio api base cannot carry credentials"))?;
        endpoint
            .set_password(Some(&settings.auth_token))
            .map_err(|_| anyhow!("twilio api base cannot carry credentials"))?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            agent,
            endpoint,
            sms_from: settings.sms_from.clone(),
            whatsapp_from: settings.whatsapp_from.clone(),
        })
    }

    fn post(&self, from: &str, to: &str, body: &str) -> Result<()> {
        match self
            .agent
            .post(self.endpoint.as_str())
            .send_form(&[("From", from), ("To", to), ("Body", body)])
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                Err(anyhow!(
                    "twilio rejected message ({}): {}",
                    code,
                    detail.chars().take(200).collect::<String>()
                ))
            }
            Err(err) => Err(anyhow!("twilio request failed: {}", err)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Sms,
    Whatsapp,
}

pub struct TwilioTransport {
    client: Arc<TwilioClient>,
    kind: Kind,
}

impl TwilioTransport {
    pub fn sms(client: Arc<TwilioClient>) -> Self {
        Self {
            client,
            kind: Kind::Sms,
        }
    }

    pub fn whatsapp(client: Arc<TwilioClient>) -> Self {
        Self {
            client,
            kind: Kind::Whatsapp,
        }
    }
}

impl Transport for TwilioTransport {
    fn name(&self) -> &'static str {
        match self.kind {
            Kind::Sms => "sms",
            Kind::Whatsapp => "whatsapp",
        }
    }

    fn deliver(&self, _channel: &str, recipient: Option<&str>, message: &str) -> Result<()> {
        let recipient = recipient
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| anyhow!("{} delivery needs a recipient", self.name()))?;
        match self.kind {
            Kind::Sms => {
                let from = self
                    .client
                    .sms_from
                    .as_deref()
                    .ok_or_else(|| anyhow!("no sms sender number configured"))?;
                self.client.post(from, recipient, message)
            }
            Kind::Whatsapp => {
                let from = self
                    .client
                    .whatsapp_from
                    .as_deref()
                    .ok_or_else(|| anyhow!("no whatsapp sender number configured"))?;
                self.client.post(
                    &whatsapp_address(from),
                    &whatsapp_address(recipient),
                    message,
                )
            }
        }
    }
}

fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    fn settings(api_base: String) -> TwilioSettings {
        TwilioSettings {
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
            sms_from: Some("+15550001".into()),
            whatsapp_from: Some("+15550002".into()),
            api_base,
        }
    }

    /// Accept one request, answer with `status`, and hand back the raw request.
    fn one_shot_server(status: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read line");
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("body");
            let mut stream = stream;
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}",
                status
            );
            stream.write_all(reply.as_bytes()).expect("reply");
            head + &String::from_utf8_lossy(&body)
        });
        (base, handle)
    }

    #[test]
    fn whatsapp_prefix_is_added_once() {
        assert_eq!(whatsapp_address("+1555"), "whatsapp:+1555");
        assert_eq!(whatsapp_address("whatsapp:+1555"), "whatsapp:+1555");
    }

    #[test]
    fn posts_form_with_basic_auth() -> Result<()> {
        let (base, server) = one_shot_server("201 Created");
        let client = Arc::new(TwilioClient::new(&settings(base))?);
        TwilioTransport::whatsapp(client).deliver("soft-broadcast", Some("+15559999"), "smoke")?;
        let request = server.join().expect("server");
        assert!(request.starts_with("POST /2010-04-01/Accounts/AC123/Messages.json"));
        assert!(request.to_ascii_lowercase().contains("authorization: basic "));
        assert!(request.contains("To=whatsapp%3A%2B15559999"));
        assert!(request.contains("Body=smoke"));
        Ok(())
    }

    #[test]
    fn error_status_is_a_failure() -> Result<()> {
        let (base, server) = one_shot_server("401 Unauthorized");
        let client = Arc::new(TwilioClient::new(&settings(base))?);
        let result = TwilioTransport::sms(client).deliver("emergency", Some("+15559999"), "fire");
        server.join().expect("server");
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut cfg = settings("https://api.twilio.com".into());
        cfg.auth_token = String::new();
        assert!(TwilioClient::new(&cfg).is_err());
    }
}
