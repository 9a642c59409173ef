//! # ethgate-core
//!
//! Core library for the ethgate multi-chain Ethereum JSON-RPC gateway.
//!
//! The gateway is a reverse proxy: it accepts JSON-RPC requests over HTTP
//! POST or WebSocket for one of several configured chains, dispatches each
//! request to one or more upstream endpoints under a configurable strategy,
//! and returns the upstream response to the client.
//!
//! Main pieces:
//!
//! - **[`upstream`]**: the endpoint abstraction. An HTTP variant with an
//!   optional dedicated archive-node URL, and a WebSocket variant with a
//!   persistent, reconnecting connection that multiplexes in-flight requests
//!   by a server-assigned correlation id.
//!
//! - **[`strategy`]**: four dispatch policies (`NAIVE`, `RACE`, `FALLBACK`,
//!   `BALANCING`) that route one logical request across the chain's upstream
//!   pool, with per-upstream cool-off on failure.
//!
//! - **[`cache`]**: a bounded 2Q response cache keyed by
//!   `(chainId, method, params)`. Only responses to archive-classified
//!   requests are inserted; archive data is immutable, so entries need no
//!   TTL.
//!
//! - **[`archive`]**: the classifier that decides whether a request targets
//!   historical state (more than 100 blocks behind the upstream's head).
//!
//! - **[`registry`]**: the per-chain runtime bundle (upstreams, strategy,
//!   access policy) plus the background health sweep that reorders upstreams
//!   by measured latency. Published process-wide through an atomic swap so
//!   hot-reload replaces the whole object and cancels the old one's tasks.

pub mod archive;
pub mod block_param;
pub mod cache;
pub mod config;
pub mod errors;
pub mod health;
pub mod limitation;
pub mod metrics;
pub mod registry;
pub mod request;
pub mod strategy;
pub mod types;
pub mod upstream;
