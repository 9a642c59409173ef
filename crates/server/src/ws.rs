//! WebSocket client sessions.
//!
//! Each inbound text frame is one JSON-RPC request, dispatched through the
//! chain's strategy like the HTTP path but without the cache. The next
//! frame is only read after the previous reply has been written, so reply
//! order always matches request order within a session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use ethgate_core::{limitation, metrics, request::Request, types::error_response_bytes};
use tracing::{debug, error};

use crate::AppState;

pub async fn handle_upgrade(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let Ok(chain_id) = chain_id.parse::<u64>() else {
        metrics::count("bad_request");
        return (StatusCode::BAD_REQUEST, "Invalid ChainId").into_response();
    };
    upgrade.on_upgrade(move |socket| run_session(state, chain_id, socket))
}

async fn run_session(state: AppState, chain_id: u64, mut socket: WebSocket) {
    debug!(chain_id, "ws session opened");

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let running = state.config.load();
        let Some(chain) = running.chain(chain_id) else {
            metrics::count("bad_request");
            break;
        };

        let req = Arc::new(Request::new(chain_id, Bytes::from(text.to_string())));
        metrics::count(&req.data.method);

        if let Err(e) = limitation::validate_call(&chain, &req.data) {
            error!(log_id = %req.log_id, chain_id, method = %req.data.method, error = %e, "ws request denied");
            break;
        }

        let reply = match chain.dispatch(Arc::clone(&req)).await {
            Ok(body) => body,
            Err(e) => {
                error!(log_id = %req.log_id, chain_id, method = %req.data.method, error = %e, "ws dispatch failed");
                error_response_bytes(&req.data.id, &e.to_string())
            }
        };

        let reply_text = String::from_utf8_lossy(&reply).into_owned();
        if socket.send(Message::Text(reply_text.into())).await.is_err() {
            break;
        }
    }

    debug!(chain_id, "ws session closed");
}
