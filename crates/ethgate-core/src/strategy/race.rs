//! Fan-out race.
//!
//! Sends the request to every upstream concurrently and returns the first
//! classified reply. A reply with no top-level `error` field wins as a
//! success; a reply carrying an upstream-formulated JSON-RPC error is
//! returned verbatim even if a sibling might still succeed — surfacing the
//! upstream's own error envelope immediately beats holding the client for
//! the full deadline. Transport failures, malformed bodies, and panicked
//! sub-tasks only count toward the failure tally.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{sync::mpsc, time::Instant};

use super::Strategy;
use crate::{
    errors::GatewayError,
    registry::ChainRuntime,
    request::Request,
    types::{is_json_object, no_error_field},
};

/// Global deadline for one raced request.
pub const RACE_DEADLINE: Duration = Duration::from_secs(10);

enum Outcome {
    Success(Bytes),
    Failed(Bytes),
    Error,
}

pub struct RaceStrategy;

#[async_trait]
impl Strategy for RaceStrategy {
    async fn handle(
        &self,
        chain: &ChainRuntime,
        req: Arc<Request>,
    ) -> Result<Bytes, GatewayError> {
        let started = Instant::now();
        let upstreams = chain.snapshot().await;
        let contenders = upstreams.len();
        let (outcome_tx, mut outcome_rx) = mpsc::channel(contenders.max(1));

        for upstream in upstreams {
            let req = Arc::clone(&req);
            let tx = outcome_tx.clone();
            let task = tokio::spawn(async move {
                match upstream.handle(&req).await {
                    Ok(body) if no_error_field(&body) => Outcome::Success(body),
                    // An upstream-formulated error envelope is surfaced to
                    // the client verbatim; bytes that are not even a JSON
                    // object only count toward the failure tally.
                    Ok(body) if is_json_object(&body) => Outcome::Failed(body),
                    Ok(_) => {
                        tracing::debug!(log_id = %req.log_id, "race discarding malformed reply");
                        Outcome::Error
                    }
                    Err(e) => {
                        tracing::debug!(log_id = %req.log_id, error = %e, "race contender failed");
                        Outcome::Error
                    }
                }
            });
            // A second task shields the collector from contender panics:
            // a JoinError is tallied like any other failure.
            tokio::spawn(async move {
                let outcome = task.await.unwrap_or(Outcome::Error);
                let _ = tx.send(outcome).await;
            });
        }
        drop(outcome_tx);

        let deadline = started + RACE_DEADLINE;
        let mut failures = 0;
        while failures < contenders {
            match tokio::time::timeout_at(deadline, outcome_rx.recv()).await {
                Err(_) => {
                    tracing::debug!(log_id = %req.log_id, "race deadline elapsed");
                    return Err(GatewayError::Timeout);
                }
                Ok(None) => break,
                Ok(Some(Outcome::Success(body))) => {
                    tracing::debug!(
                        log_id = %req.log_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "race won"
                    );
                    return Ok(body);
                }
                Ok(Some(Outcome::Failed(body))) => {
                    tracing::debug!(log_id = %req.log_id, "race surfacing upstream error body");
                    return Ok(body);
                }
                Ok(Some(Outcome::Error)) => failures += 1,
            }
        }

        tracing::error!(log_id = %req.log_id, contenders, "all race contenders failed");
        Err(GatewayError::AllUpstreamsFailed)
    }
}
