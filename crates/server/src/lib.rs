//! HTTP/WebSocket surface of the ethgate gateway.
//!
//! Routes:
//! - `POST /http/{chainId}` — single JSON-RPC exchange (cache-enabled)
//! - `GET /ws/{chainId}` — WebSocket session, one request per frame
//! - `GET /health` — per-chain upstream status snapshot
//! - `GET /metrics` — Prometheus render

pub mod router;
pub mod ws;

use std::sync::Arc;

use ethgate_core::{cache::ResponseCache, health::HealthReporter, registry::ConfigHandle};
use metrics_exporter_prometheus::PrometheusHandle;

/// Shared state carried by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigHandle>,
    pub cache: Arc<ResponseCache>,
    pub health: Arc<HealthReporter>,
    /// Absent in tests that do not install a recorder.
    pub prometheus: Option<PrometheusHandle>,
}
