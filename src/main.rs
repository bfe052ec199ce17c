// =============================================================================
// Sensex Tick Relay: Main Entry Point
// =============================================================================
//
// Polls the futures quote API once a minute during the trading session,
// buffers de-duplicated ticks per expiry in memory, and serves them to the
// chart front-end over HTTP. Nothing is persisted; a restart starts empty.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod clock;
mod collector;
mod market_data;
mod runtime_config;
mod scheduler;
mod types;
mod upstream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::clock::{Clock, SystemClock, WallZone};
use crate::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use crate::scheduler::Scheduler;
use crate::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Sensex tick relay starting up");

    let config_path =
        std::env::var("SENSEX_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();
    config.validate().context("invalid configuration")?;

    let zone = WallZone::from_config(config.utc_offset.as_deref())?;
    info!(
        upstream_url = %config.upstream_url,
        poll_interval_secs = config.poll_interval_secs,
        request_timeout_secs = config.request_timeout_secs,
        session_start = %config.session.start,
        session_close = %config.session.close,
        reset_at = %config.session.reset_at,
        zone = %zone,
        "Configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config.clone()));

    // ── 3. Upstream client & scheduler ───────────────────────────────────
    let upstream = Arc::new(UpstreamClient::new(
        config.upstream_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ));
    info!(url = %upstream.url(), "Upstream client ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(zone));
    let scheduler = Scheduler::new(state.clone(), upstream, clock);
    let period = Duration::from_secs(config.poll_interval_secs);
    tokio::spawn(scheduler.run(period));

    // ── 4. Start the API server ──────────────────────────────────────────
    let bind_addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "Sensex server running on http://{}", bind_addr);

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received: stopping");

    info!(
        ticks = state.tick_store.tick_count(),
        "Sensex tick relay shut down; buffered ticks discarded"
    );
    Ok(())
}
