//! HTTP upstream.
//!
//! Request/response over a shared connection-pooling client. Archive
//! requests are steered to the dedicated archive URL when one is
//! configured; everything else goes to the primary URL.

use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, ClientBuilder};

use super::{parse_block_height, Upstream, UpstreamError, DEAD_LATENCY};
use crate::{errors::ConfigError, request::Request};

/// Per-call timeout for upstream HTTP exchanges.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections kept per upstream host.
const MAX_IDLE_CONNS_PER_HOST: usize = 200;

/// Builds the shared HTTP client all HTTP upstreams use.
///
/// # Errors
///
/// Returns a validation error if the TLS backend fails to initialize.
pub fn build_client() -> Result<Client, ConfigError> {
    ClientBuilder::new()
        .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
        .timeout(REQUEST_TIMEOUT)
        .tcp_nodelay(true)
        .use_rustls_tls()
        .build()
        .map_err(|e| ConfigError::Validation(format!("http client build failed: {e}")))
}

pub struct HttpUpstream {
    chain_id: u64,
    url: String,
    old_trie_url: String,
    client: Client,
    block_height: AtomicU64,
    latency: AtomicI64,
}

impl HttpUpstream {
    #[must_use]
    pub fn new(chain_id: u64, url: String, old_trie_url: String, client: Client) -> Self {
        Self {
            chain_id,
            url,
            old_trie_url,
            client,
            block_height: AtomicU64::new(0),
            latency: AtomicI64::new(0),
        }
    }

    /// Picks the target URL for a request: the archive URL when the request
    /// addresses historical state and a distinct archive URL is configured.
    fn target_url(&self, req: &Request) -> &str {
        if req.classify(self.block_height()) && self.old_trie_url != self.url {
            &self.old_trie_url
        } else {
            &self.url
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn handle(&self, req: &Request) -> Result<Bytes, UpstreamError> {
        let target = self.target_url(req);
        tracing::debug!(
            log_id = %req.log_id,
            method = %req.data.method,
            url = %target,
            "dispatching to http upstream"
        );

        let response = self
            .client
            .post(target)
            .header(CONTENT_TYPE, "application/json")
            // Bytes clone is a refcount bump, not a copy.
            .body(req.req_bytes.clone())
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        // Non-2xx replies still carry a body the caller wants to inspect.
        response.bytes().await.map_err(UpstreamError::from_reqwest)
    }

    async fn refresh_block_height(&self) {
        let probe = Request::block_number_probe(self.chain_id);
        let start = Instant::now();
        match self.handle(&probe).await {
            Ok(body) => {
                let elapsed = i64::try_from(start.elapsed().as_nanos()).unwrap_or(DEAD_LATENCY);
                self.latency.store(elapsed, Ordering::Relaxed);
                let height = parse_block_height(&body).unwrap_or(0);
                self.block_height.store(height, Ordering::Relaxed);
                tracing::debug!(url = %self.url, height, latency_ns = elapsed, "refreshed upstream height");
            }
            Err(e) => {
                self.latency.store(DEAD_LATENCY, Ordering::Relaxed);
                self.block_height.store(0, Ordering::Relaxed);
                tracing::warn!(url = %self.url, error = %e, "upstream height probe failed");
            }
        }
    }

    fn rpc_url(&self) -> &str {
        &self.url
    }

    fn block_height(&self) -> u64 {
        self.block_height.load(Ordering::Relaxed)
    }

    fn latency(&self) -> i64 {
        self.latency.load(Ordering::Relaxed)
    }
}
