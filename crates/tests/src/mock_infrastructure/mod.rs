//! Reusable mock upstreams and gateway harness.

pub mod test_helpers;
pub mod websocket_mock;

pub use rpc_mock::{DelayedRpcServer, RpcMockBuilder};
pub use test_helpers::{
    chain_config, parse_json, spawn_gateway, spawn_gateway_with_handle, wait_for_height,
    TestGateway,
};
pub use websocket_mock::EchoWsServer;
