mod config;
mod recorder;
mod refresh;
mod server;
mod source;

use anyhow::Result;
use config::parse_args;
use flowscope_core::{Msg, PROTOCOL_VERSION};
use source::DirSource;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "node".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = parse_args()?;

    tracing::info!(
        source = %config.source_dir.display(),
        record = ?config.record_dir,
        interval_ms = config.interval.as_millis() as u64,
        "flowscope-agent starting"
    );

    // Clean stale socket
    let _ = std::fs::remove_file(&config.socket);

    // Broadcast so multiple viewers can subscribe
    let (bus_tx, _bus_rx) = broadcast::channel::<Msg>(64);

    let recorder = match &config.record_dir {
        Some(dir) => Some(recorder::spawn(recorder::Recorder::open(dir)?)),
        None => None,
    };

    let _refresh = refresh::spawn(
        DirSource::new(&config.source_dir),
        config.interval,
        bus_tx.clone(),
        recorder,
    );

    let hello = Msg::Hello {
        version: PROTOCOL_VERSION.to_string(),
        host: host_name(),
    };
    server::run(&config.socket, hello, bus_tx).await
}
