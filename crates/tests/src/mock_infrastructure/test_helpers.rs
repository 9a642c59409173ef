//! Gateway harness: boots the full axum app on an ephemeral port against a
//! config string, exactly the way the binary does minus logging and the
//! metrics recorder.

use std::{sync::Arc, time::Duration};

use ethgate_core::{
    cache::ResponseCache,
    config,
    health::HealthReporter,
    registry::{ConfigHandle, RunningConfig},
};
use serde_json::Value;
use server::{router, AppState};
use tokio::task::JoinHandle;

pub struct TestGateway {
    pub base_url: String,
    pub state: AppState,
    client: reqwest::Client,
    _server: JoinHandle<()>,
}

/// Renders a one-chain config with limitation disabled.
#[must_use]
pub fn chain_config(chain_id: u64, upstreams: &[&str], strategy: &str) -> String {
    serde_json::json!({
        chain_id.to_string(): {
            "upstreams": upstreams,
            "oldTrieUrl": "",
            "strategy": strategy,
            "methodLimitationEnabled": false,
            "allowedMethods": [],
            "contractWhitelist": []
        }
    })
    .to_string()
}

/// Builds the running config from `config_json` and serves the router on
/// an ephemeral port.
pub async fn spawn_gateway(config_json: &str) -> TestGateway {
    let cfg = config::parse(config_json.as_bytes()).expect("test config parses");
    let running = RunningConfig::build(&cfg).expect("test config builds");
    spawn_gateway_with_handle(Arc::new(ConfigHandle::new(running))).await
}

/// Same, against a caller-owned handle (hot-reload tests swap it).
pub async fn spawn_gateway_with_handle(handle: Arc<ConfigHandle>) -> TestGateway {
    let state = AppState {
        config: handle,
        cache: Arc::new(ResponseCache::default()),
        health: Arc::new(HealthReporter::new()),
        prometheus: None,
    };

    let app = router::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind gateway");
    let addr = listener.local_addr().expect("gateway addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestGateway {
        base_url: format!("http://{addr}"),
        state,
        client: reqwest::Client::new(),
        _server: server,
    }
}

impl TestGateway {
    /// Posts one JSON-RPC body and returns `(status, body)`.
    pub async fn post_rpc(&self, chain_id: u64, body: &str) -> (u16, String) {
        let response = self
            .client
            .post(format!("{}/http/{chain_id}", self.base_url))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("gateway reachable");
        let status = response.status().as_u16();
        (status, response.text().await.expect("gateway body"))
    }

    pub async fn get(&self, path: &str) -> (u16, String) {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("gateway reachable");
        let status = response.status().as_u16();
        (status, response.text().await.expect("gateway body"))
    }

    /// The gateway's WebSocket endpoint for a chain.
    #[must_use]
    pub fn ws_url(&self, chain_id: u64) -> String {
        format!("{}/ws/{chain_id}", self.base_url.replace("http://", "ws://"))
    }
}

/// Polls until the chain's first upstream reports the expected head height
/// (set by the initial health sweep), or panics after ~5 s.
pub async fn wait_for_height(gateway: &TestGateway, chain_id: u64, height: u64) {
    for _ in 0..100 {
        let running = gateway.state.config.load();
        if let Some(chain) = running.chain(chain_id) {
            let pool = chain.snapshot().await;
            if pool.iter().any(|up| up.block_height() == height) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("upstream never reported height {height} for chain {chain_id}");
}

/// Convenience JSON parse for assertion bodies.
#[must_use]
pub fn parse_json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or(Value::Null)
}
