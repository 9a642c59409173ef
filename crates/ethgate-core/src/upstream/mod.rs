//! Upstream endpoint abstraction.
//!
//! An upstream is one external JSON-RPC endpoint serving one chain. Two
//! variants satisfy the same contract: request/response HTTP, and a
//! multiplexed bidirectional WebSocket with a persistent, reconnecting
//! connection. `handle` must be safe to call concurrently from many tasks.

pub mod errors;
pub mod http;
pub mod ws;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use url::Url;

use crate::{block_param, errors::ConfigError, request::Request, types::JsonRpcResponse};

pub use errors::UpstreamError;
pub use http::HttpUpstream;
pub use ws::WsUpstream;

/// Latency sentinel marking an upstream as dead.
pub const DEAD_LATENCY: i64 = i64::MAX;

/// Common contract for HTTP and WebSocket upstreams.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends one request and returns the raw response body. Errors are
    /// transport failures only; JSON-RPC error envelopes come back as `Ok`.
    async fn handle(&self, req: &Request) -> Result<Bytes, UpstreamError>;

    /// Probes the endpoint with `eth_blockNumber`, recording round-trip
    /// latency (or [`DEAD_LATENCY`] on failure) and the reported head.
    async fn refresh_block_height(&self);

    fn rpc_url(&self) -> &str;

    /// Last head height seen from this endpoint; `0` means unknown.
    fn block_height(&self) -> u64;

    /// Last measured round-trip latency in nanoseconds.
    fn latency(&self) -> i64;

    fn is_alive(&self) -> bool {
        self.latency() != DEAD_LATENCY
    }
}

/// Builds the upstream matching the URL scheme.
///
/// `old_trie_url` only applies to the HTTP variant; pass the primary URL
/// when there is no dedicated archive node.
///
/// # Errors
///
/// Returns a validation error for unparseable URLs or unsupported schemes.
pub fn build_upstream(
    chain_id: u64,
    url: &str,
    old_trie_url: &str,
    client: &reqwest::Client,
    shutdown: &broadcast::Sender<()>,
) -> Result<Arc<dyn Upstream>, ConfigError> {
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::Validation(format!("invalid upstream url {url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(Arc::new(HttpUpstream::new(
            chain_id,
            url.to_string(),
            old_trie_url.to_string(),
            client.clone(),
        ))),
        "ws" | "wss" => Ok(WsUpstream::spawn(chain_id, url.to_string(), shutdown)),
        scheme => {
            Err(ConfigError::Validation(format!("unsupported upstream url scheme: {scheme}")))
        }
    }
}

/// Parses the head height out of an `eth_blockNumber` reply body.
/// Returns `None` when the body or the hex quantity does not parse.
pub(crate) fn parse_block_height(body: &[u8]) -> Option<u64> {
    let response: JsonRpcResponse = serde_json::from_slice(body).ok()?;
    let result = response.result?;
    block_param::parse_hex_quantity(result.as_str()?)
}
