use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::app::Firewatch;
use crate::error::PipelineError;
use crate::stream::{write_part, BOUNDARY};

const MAX_REQUEST_BYTES: usize = 8192;
const VIEWER_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const INDEX_HTML: &str = r#"<!doctype html>
<title>Fire Detection</title>
<h1>Fire Detection</h1>
<form action="/start" method="post">
  <label for="input_source">Input source (video file, RTSP or ESP32-CAM URL):</label><br>
  <input type="text" id="input_source" name="input_source" required>
  <button type="submit">Start detection</button>
</form>
<form action="/stop" method="post"><button type="submit">Stop detection</button></form>
<form action="/model" method="post">
  <label for="model_id">Detector model:</label>
  <input type="text" id="model_id" name="model_id" required>
  <button type="submit">Switch model</button>
</form>
<h2>Output</h2>
<p><a href="/video_feed" target="_blank">Live stream</a> | <a href="/status">Status</a></p>
<img src="/video_feed" width="640" height="360">
"#;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Open viewer streams end on their next frame.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    app: Arc<Firewatch>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, app: Arc<Firewatch>) -> Self {
        Self { cfg, app }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let app = self.app;
        let join = std::thread::Builder::new()
            .name("api".into())
            .spawn(move || {
                if let Err(err) = run_api(listener, app, shutdown_thread) {
                    log::error!("http api stopped: {}", err);
                }
            })?;
        log::info!("http api listening on {}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, app: Arc<Firewatch>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let app = app.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name("api-conn".into())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &app, &shutdown) {
                            log::debug!("request from {} failed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("could not spawn connection handler: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, app: &Firewatch, shutdown: &AtomicBool) -> Result<()> {
    // The listener is non-blocking; accepted sockets must not be.
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    log::debug!("{} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML.as_bytes()),
        ("GET", "/health") => write_json(&mut stream, 200, &json!({ "status": "ok" })),
        ("GET", "/status") => {
            let report = app.status.status();
            write_response(&mut stream, 200, "application/json", &serde_json::to_vec(&report)?)
        }
        ("GET", "/video_feed") => serve_video_feed(&mut stream, app, shutdown),
        ("GET", "/start") | ("POST", "/start") => {
            let Some(source) = request.param(&["input_source", "source"]) else {
                return write_json(&mut stream, 400, &json!({ "error": "missing input_source" }));
            };
            match app.supervisor.start(&source) {
                Ok(session_id) => write_json(
                    &mut stream,
                    200,
                    &json!({ "status": "started", "session_id": session_id, "source": source }),
                ),
                Err(err) => write_error(&mut stream, &err),
            }
        }
        ("GET", "/stop") | ("POST", "/stop") => match app.supervisor.stop() {
            Ok(()) => write_json(&mut stream, 200, &json!({ "status": "stopped" })),
            Err(err) => write_error(&mut stream, &err),
        },
        ("GET", "/model") | ("POST", "/model") => {
            let Some(model_id) = request.param(&["model_id", "id"]) else {
                return write_json(
                    &mut stream,
                    200,
                    &json!({
                        "active_model": app.supervisor.active_model(),
                        "available": app.supervisor.available_models(),
                    }),
                );
            };
            match app.supervisor.change_detector(&model_id) {
                Ok(()) => write_json(&mut stream, 200, &json!({ "active_model": model_id })),
                Err(err) => write_error(&mut stream, &err),
            }
        }
        (_, "/" | "/health" | "/status" | "/video_feed" | "/start" | "/stop" | "/model") => {
            write_json(&mut stream, 405, &json!({ "error": "method_not_allowed" }))
        }
        _ => write_json(&mut stream, 404, &json!({ "error": "not_found" })),
    }
}

fn serve_video_feed(stream: &mut TcpStream, app: &Firewatch, shutdown: &AtomicBool) -> Result<()> {
    stream.set_write_timeout(Some(VIEWER_WRITE_TIMEOUT))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        BOUNDARY
    );
    stream.write_all(header.as_bytes())?;
    let content_type = app.broadcaster.content_type();
    for image in app.broadcaster.subscribe() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Err(err) = write_part(stream, content_type, &image.bytes) {
            log::debug!("viewer disconnected: {}", err);
            break;
        }
    }
    Ok(())
}

fn write_error(stream: &mut TcpStream, err: &PipelineError) -> Result<()> {
    let (status, code) = match err {
        PipelineError::SourceUnavailable { .. } => (503, "source_unavailable"),
        PipelineError::UnknownModel(_) => (404, "unknown_model"),
        PipelineError::ModelLoad { .. } => (500, "model_load_failed"),
        PipelineError::ShutdownTimeout(_) => (503, "shutdown_timeout"),
        _ => (500, "internal"),
    };
    log::warn!("request rejected: {}", err);
    write_json(stream, status, &json!({ "error": code, "detail": err.to_string() }))
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data.len();
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end.min(data.len())]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if header_end + content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }
    let mut body = data.get(header_end..).unwrap_or_default().to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    let mut params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let is_form = headers
        .get("content-type")
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        params.extend(url::form_urlencoded::parse(&body).into_owned());
    }

    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        params,
    })
}

fn write_json(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    write_response(stream, status, "application/json", body.to_string().as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    params: HashMap<String, String>,
}

impl HttpRequest {
    /// First non-empty value among `names` (form body or query string).
    fn param(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| self.params.get(*name))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }
}
