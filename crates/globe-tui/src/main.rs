mod app;
mod http;
mod player;
mod theme;
mod widgets;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use globe_core::browse::{BrowseCore, BrowseEvent};
use globe_core::directory::DirectoryClient;
use globe_core::playback::SinkCommand;
use globe_core::state::{BroadcastMessage, StateHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = globe_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("tui.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; default to debug for app code but suppress noisy
    // connection-level DEBUG from HTTP client internals (hyper_util, reqwest).
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("radioglobe log: {}", log_path.display());

    tracing::info!("radioglobe starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = globe_core::config::Config::load().unwrap_or_default();
    let client = Arc::new(DirectoryClient::new(config.directory.base_url.clone())?);

    // ── Channels ─────────────────────────────────────────────────────────────
    // Everything settles into one BrowseEvent stream so the browse loop is
    // the single writer of shared state.
    let (event_tx, event_rx) = mpsc::channel::<BrowseEvent>(1024);
    let (broadcast_tx, broadcast_rx) = broadcast::channel::<BroadcastMessage>(1024);
    let (sink_tx, sink_rx) = mpsc::unbounded_channel::<SinkCommand>();

    let state_handle = StateHandle::new();

    // ── Audio sink driver (mpv) ──────────────────────────────────────────────
    player::spawn(config.player.default_volume, sink_rx, event_tx.clone());

    // ── HTTP server ──────────────────────────────────────────────────────────
    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_handle.clone(),
            event_tx.clone(),
        );
    }

    // ── Browse event loop ────────────────────────────────────────────────────
    let core = BrowseCore::new(sink_tx, state_handle.clone(), broadcast_tx.clone());
    let core_event_tx = event_tx.clone();
    tokio::spawn(async move {
        core.run(client, event_rx, core_event_tx).await;
    });

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(state_handle, event_tx);
    app.run(broadcast_rx).await?;

    Ok(())
}
