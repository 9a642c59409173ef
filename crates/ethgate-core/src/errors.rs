//! Gateway-level error taxonomy.
//!
//! Upstream errors are reported to the strategy, which decides retry vs
//! surface; strategy errors are surfaced to the gateway, which maps them to
//! a JSON-RPC error envelope (code `-32602`) and HTTP 500.

use thiserror::Error;

use crate::{limitation::PolicyError, upstream::UpstreamError};

/// Errors a dispatch strategy can surface to the gateway.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The race deadline elapsed with no upstream reply.
    #[error("timeout error")]
    Timeout,

    /// Every race participant failed without producing a reply body.
    #[error("all upstream requests are failed")]
    AllUpstreamsFailed,

    /// The fallback loop exhausted the pool.
    #[error("no valid upstream")]
    NoValidUpstream,

    /// No configuration exists for the requested chain.
    #[error("chain {0} not supported")]
    ChainNotSupported(u64),
}

/// Errors raised while building a running configuration.
///
/// Fatal only on the initial load; hot reloads keep the previous
/// configuration and log a warning.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("config read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}
