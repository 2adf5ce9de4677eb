//! firewatchd - fire and smoke detection daemon
//!
//! Serves the control page, the live annotated MJPEG stream and the status
//! endpoint. Capture sessions are started and stopped over HTTP; alerts are
//! evaluated on every status request and, when configured, on a timer.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use firewatch::api::{ApiConfig, ApiServer};
use firewatch::{Firewatch, FirewatchConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fire and smoke detection daemon")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "FIREWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the HTTP interface (overrides config).
    #[arg(long)]
    addr: Option<String>,

    /// Start capturing from this source immediately.
    #[arg(long)]
    source: Option<String>,

    /// Detector model to activate at startup.
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = FirewatchConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        cfg.api_addr = addr;
    }
    if let Some(model) = args.model {
        cfg.detector.default_model = model;
    }
    if let Some(source) = args.source {
        cfg.capture.default_source = Some(source);
    }
    cfg.validate()?;

    let app = Arc::new(Firewatch::from_config(&cfg)?);

    if let Some(source) = cfg.capture.default_source.as_deref() {
        match app.supervisor.start(source) {
            Ok(id) => log::info!("session {} capturing {}", id, source),
            Err(err) => log::warn!("default source not started: {}", err),
        }
    }

    let poll_stop = Arc::new(AtomicBool::new(false));
    let poller = match cfg.status_poll_interval {
        Some(interval) => Some(app.status.spawn_poller(interval, poll_stop.clone())?),
        None => None,
    };

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        app.clone(),
    )
    .spawn()
    .context("start http api")?;
    log::info!("firewatchd ready on http://{}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    let _ = rx.recv();
    log::info!("shutdown signal received");
    poll_stop.store(true, Ordering::SeqCst);
    api_handle.stop()?;
    if let Some(poller) = poller {
        if poller.join().is_err() {
            log::warn!("status poller panicked");
        }
    }
    if let Err(err) = app.supervisor.stop() {
        log::warn!("capture session did not stop cleanly: {}", err);
    }
    log::info!("firewatchd stopped");
    Ok(())
}
