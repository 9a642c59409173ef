use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use ethgate_core::{
    cache::ResponseCache,
    config,
    health::HealthReporter,
    registry::ConfigHandle,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use server::{router, AppState};

/// Listen address override.
const LISTEN_ENV: &str = "ETHGATE_LISTEN";
const DEFAULT_LISTEN: &str = "0.0.0.0:3005";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ethgate_core=info,server=info"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("ETHGATE_LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    // The initial load is fatal on failure; afterwards the poller keeps the
    // last good config on any reload error.
    let config_path = config::config_path();
    let (running, digest) = config::load_initial(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let handle = Arc::new(ConfigHandle::new(running));
    let _reload = config::spawn_reload_task(
        config_path.clone(),
        Arc::clone(&handle),
        digest,
        config::RELOAD_INTERVAL,
    );
    info!(config = %config_path.display(), "configuration loaded");

    let state = AppState {
        config: handle,
        cache: Arc::new(ResponseCache::default()),
        health: Arc::new(HealthReporter::new()),
        prometheus: Some(prometheus),
    };
    let app = router::build_router(state);

    let listen = std::env::var(LISTEN_ENV).unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let addr: SocketAddr = listen.parse().with_context(|| format!("invalid {LISTEN_ENV}: {listen}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
