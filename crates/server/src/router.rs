//! HTTP routing and the single-exchange RPC handler.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use ethgate_core::{
    cache,
    limitation,
    metrics,
    request::Request,
    types::{error_response_bytes, JsonRpcResponse},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::{ws, AppState};

/// Requests slower than this are logged.
const SLOW_REQUEST_MS: u128 = 5_000;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/http/{chain_id}", post(handle_rpc))
        .route("/ws/{chain_id}", get(ws::handle_upgrade))
        .layer(cors)
        .with_state(state)
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn bad_request(reason: &'static str) -> Response {
    metrics::count("bad_request");
    (StatusCode::BAD_REQUEST, reason).into_response()
}

async fn handle_health(State(state): State<AppState>) -> Response {
    let running = state.config.load();
    let snapshot = state.health.snapshot(&running).await;
    match serde_json::to_vec(&*snapshot) {
        Ok(body) => json_response(StatusCode::OK, Bytes::from(body)),
        Err(e) => {
            error!(error = %e, "health snapshot serialization failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "health unavailable").into_response()
        }
    }
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// `POST /http/{chainId}`: the cache-enabled single-exchange path.
pub async fn handle_rpc(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    body: Bytes,
) -> Response {
    let Ok(chain_id) = chain_id.parse::<u64>() else {
        return bad_request("Invalid ChainId");
    };
    let running = state.config.load();
    let Some(chain) = running.chain(chain_id) else {
        return bad_request("Unsupported ChainId");
    };

    let started = Instant::now();
    let req = Arc::new(Request::new(chain_id, body));
    metrics::count(&req.data.method);

    if let Err(e) = limitation::validate_call(&chain, &req.data) {
        error!(log_id = %req.log_id, chain_id, method = %req.data.method, error = %e, "request denied");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_response_bytes(&req.data.id, &e.to_string()),
        );
    }

    let key = cache::cache_key(chain_id, &req.data);
    if let Some(cached) = state.cache.get(&key) {
        metrics::count("hit_cache");
        metrics::count(&format!("hit_cache_{}", req.data.method));
        info!(log_id = %req.log_id, chain_id, method = %req.data.method, "served from cache");
        return json_response(StatusCode::OK, cached);
    }
    metrics::count("miss_cache");

    let result = chain.dispatch(Arc::clone(&req)).await;

    let elapsed_ms = started.elapsed().as_millis();
    if elapsed_ms > SLOW_REQUEST_MS {
        info!(log_id = %req.log_id, method = %req.data.method, elapsed_ms = elapsed_ms as u64, "slow request");
    }
    #[allow(clippy::cast_precision_loss)]
    metrics::time(&req.data.method, elapsed_ms as f64);

    match result {
        Ok(body) => {
            if req.is_archive() && is_cacheable(&body) {
                info!(log_id = %req.log_id, chain_id, method = %req.data.method, "caching archive response");
                state.cache.put(key, body.clone());
            }
            json_response(StatusCode::OK, body)
        }
        Err(e) => {
            error!(log_id = %req.log_id, chain_id, method = %req.data.method, error = %e, "dispatch failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_response_bytes(&req.data.id, &e.to_string()),
            )
        }
    }
}

/// Cache admission: the reply must decode as a JSON-RPC success with a
/// non-null result. The archive check happened upstream of this.
fn is_cacheable(body: &Bytes) -> bool {
    match serde_json::from_slice::<JsonRpcResponse>(body) {
        Ok(response) => response.is_success() && response.result.is_some(),
        Err(_) => false,
    }
}
