//! Fallback strategies.
//!
//! Both variants walk the upstream pool one endpoint at a time, treating a
//! transport error, an undecodable body, or a JSON-RPC error envelope as a
//! failed attempt. A failed endpoint is excluded for [`FALLBACK_COOL_OFF`]
//! and then probed again.
//!
//! The sequential variant keeps `current_index` sticky on success to
//! preserve hot connections; when a cooled-off endpoint revives, it takes
//! the current slot back so recovered higher-priority upstreams are probed
//! again. The balancing variant advances `current_index` on every attempt,
//! round-robining over alive upstreams.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::Strategy;
use crate::{
    errors::GatewayError,
    registry::ChainRuntime,
    request::Request,
    types::JsonRpcResponse,
    upstream::Upstream,
};

/// How long a failed upstream stays excluded.
pub const FALLBACK_COOL_OFF: Duration = Duration::from_secs(5);

/// Shared per-chain fallback state: the cursor into the pool and the
/// per-index liveness map.
///
/// Invariant: `current() < upstream_count` for the pool the status was
/// built against; the upstream count of a chain never changes while a
/// running config is live (hot reload builds a fresh strategy).
pub(crate) struct FallbackStatus {
    current_index: Arc<AtomicUsize>,
    alive: Arc<DashMap<usize, bool>>,
}

impl FallbackStatus {
    fn new(upstream_count: usize) -> Self {
        let alive = Arc::new(DashMap::new());
        for index in 0..upstream_count {
            alive.insert(index, true);
        }
        Self { current_index: Arc::new(AtomicUsize::new(0)), alive }
    }

    fn current(&self) -> usize {
        self.current_index.load(Ordering::Relaxed)
    }

    fn set_current(&self, index: usize) {
        self.current_index.store(index, Ordering::Relaxed);
    }

    fn is_alive(&self, index: usize) -> bool {
        self.alive.get(&index).map_or(true, |entry| *entry)
    }

    fn mark_dead(&self, index: usize) {
        self.alive.insert(index, false);
    }

    /// Spawns the cool-off timer. `reclaim_current` restores the revived
    /// index as the cursor (sequential semantics), so a recovered
    /// higher-priority upstream is probed again on the next call.
    fn revive_later(&self, index: usize, reclaim_current: bool) {
        let alive = Arc::clone(&self.alive);
        let current_index = reclaim_current.then(|| Arc::clone(&self.current_index));
        tokio::spawn(async move {
            tokio::time::sleep(FALLBACK_COOL_OFF).await;
            alive.insert(index, true);
            if let Some(current) = current_index {
                current.store(index, Ordering::Relaxed);
            }
            tracing::info!(index, "upstream revived after cool-off");
        });
    }
}

/// Classifies one attempt: a body only counts as served when it decodes as
/// a JSON-RPC envelope without an error code.
async fn attempt(upstream: &Arc<dyn Upstream>, req: &Request) -> Result<Bytes, ()> {
    let body = upstream.handle(req).await.map_err(|e| {
        tracing::debug!(log_id = %req.log_id, url = %upstream.rpc_url(), error = %e, "fallback attempt failed");
    })?;
    match serde_json::from_slice::<JsonRpcResponse>(&body) {
        Ok(response) if response.is_success() => Ok(body),
        Ok(_) => {
            tracing::debug!(log_id = %req.log_id, url = %upstream.rpc_url(), "fallback attempt returned rpc error");
            Err(())
        }
        Err(e) => {
            tracing::error!(log_id = %req.log_id, error = %e, "fallback response decoding failed");
            Err(())
        }
    }
}

/// Sequential fallback: sticky cursor, failures advance it.
pub struct FallbackStrategy {
    status: FallbackStatus,
}

impl FallbackStrategy {
    #[must_use]
    pub fn new(upstream_count: usize) -> Self {
        Self { status: FallbackStatus::new(upstream_count) }
    }
}

#[async_trait]
impl Strategy for FallbackStrategy {
    async fn handle(
        &self,
        chain: &ChainRuntime,
        req: Arc<Request>,
    ) -> Result<Bytes, GatewayError> {
        let upstreams = chain.snapshot().await;
        let count = upstreams.len();
        if count == 0 {
            return Err(GatewayError::NoValidUpstream);
        }

        let mut index = self.status.current() % count;
        for _ in 0..count {
            if self.status.is_alive(index) {
                match attempt(&upstreams[index], &req).await {
                    Ok(body) => return Ok(body),
                    Err(()) => {
                        let next = (index + 1) % count;
                        self.status.mark_dead(index);
                        self.status.set_current(next);
                        self.status.revive_later(index, true);
                        tracing::info!(index, next, "fallback switching upstream");
                        index = next;
                        continue;
                    }
                }
            }
            index = (index + 1) % count;
        }

        Err(GatewayError::NoValidUpstream)
    }
}

/// Round-robin fallback: the cursor advances on every attempt.
pub struct BalancingStrategy {
    status: FallbackStatus,
}

impl BalancingStrategy {
    #[must_use]
    pub fn new(upstream_count: usize) -> Self {
        Self { status: FallbackStatus::new(upstream_count) }
    }
}

#[async_trait]
impl Strategy for BalancingStrategy {
    async fn handle(
        &self,
        chain: &ChainRuntime,
        req: Arc<Request>,
    ) -> Result<Bytes, GatewayError> {
        let upstreams = chain.snapshot().await;
        let count = upstreams.len();
        if count == 0 {
            return Err(GatewayError::NoValidUpstream);
        }

        let start = self.status.current() % count;
        let mut index = start;
        for visited in 0..count {
            if visited != 0 && index == start {
                break;
            }
            if self.status.is_alive(index) {
                self.status.set_current((index + 1) % count);
                match attempt(&upstreams[index], &req).await {
                    Ok(body) => return Ok(body),
                    Err(()) => {
                        self.status.mark_dead(index);
                        self.status.revive_later(index, false);
                        tracing::info!(index, "balancing upstream failed, rotating");
                    }
                }
            }
            index = (index + 1) % count;
        }

        Err(GatewayError::NoValidUpstream)
    }
}
