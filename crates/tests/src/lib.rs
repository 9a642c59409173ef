//! Integration tests for the ethgate gateway.
//!
//! Test modules:
//!
//! - `mock_infrastructure`: reusable mock upstreams (mockito-backed HTTP,
//!   a delayed HTTP stub for race timing, an echoing WebSocket server)
//! - `gateway_tests`: the HTTP exchange path — caching, access policy,
//!   routing errors, health endpoint
//! - `strategy_tests`: fallback cool-off and race selection against live
//!   mock upstreams
//! - `websocket_tests`: WebSocket sessions end to end, including upstream
//!   id remapping
//! - `config_reload_tests`: hot reload swapping the running config
//!
//! Everything runs against in-process servers on ephemeral ports; no
//! external nodes are required.

pub mod mock_infrastructure;

#[cfg(test)]
mod gateway_tests;
#[cfg(test)]
mod websocket_tests;
