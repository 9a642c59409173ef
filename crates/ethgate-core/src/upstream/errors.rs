//! Errors surfaced by upstream endpoints.

use thiserror::Error;

/// Failures at the upstream transport boundary.
///
/// Note the asymmetry with JSON-RPC errors: an upstream that answers with a
/// 2xx *or* non-2xx HTTP status and a body is not an error here — the body
/// is returned verbatim and the caller inspects the envelope. Only
/// transport-level failures surface as `UpstreamError`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Per-call deadline exceeded (HTTP request, or a WS reply that never
    /// arrived).
    #[error("timeout error")]
    Timeout,

    /// Failed to establish or keep a connection to the endpoint.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Network-level error from the HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Socket-level WebSocket failure while this request was being
    /// written; the connection is torn down and rebuilt.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The WS request queue stayed full through the enqueue deadline. The
    /// wire message stays a timeout, but the kind tells operators the
    /// writer is backed up rather than the upstream slow to answer.
    #[error("timeout error: ws request queue full")]
    QueueFull,

    /// The WS connection machinery went away while the request was in
    /// flight: the caller was never serviced.
    #[error("websocket channel closed")]
    ChannelClosed,
}

impl UpstreamError {
    /// Collapses reqwest timeouts into [`UpstreamError::Timeout`] so that
    /// callers see one timeout kind regardless of transport.
    #[must_use]
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}
