//! The HTTP exchange path: caching, access policy, routing errors, health.

use serde_json::json;

use crate::mock_infrastructure::{
    chain_config, parse_json, spawn_gateway, wait_for_height, RpcMockBuilder,
};

const BALANCE_AT_BLOCK_16: &str =
    r#"{"jsonrpc":"2.0","id":1,"method":"eth_getBalance","params":["0x06898143df04616a8a8f9614deb3b99ba12b3096","0x10"]}"#;

#[tokio::test]
async fn archive_response_is_served_from_cache_on_the_second_call() {
    let mut upstream = RpcMockBuilder::new().await;
    let _head = upstream.mock_block_number(1000).create_async().await;
    let balance = upstream
        .mock_method_with_body("eth_getBalance", r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;
    // Block 16 only classifies as archive once the head (1000) is known.
    wait_for_height(&gateway, 1, 1000).await;

    let (status, first) = gateway.post_rpc(1, BALANCE_AT_BLOCK_16).await;
    assert_eq!(status, 200);
    assert_eq!(parse_json(&first)["result"], json!("0x1"));

    let (status, second) = gateway.post_rpc(1, BALANCE_AT_BLOCK_16).await;
    assert_eq!(status, 200);
    // Byte-identical reply, without a second upstream call.
    assert_eq!(first, second);
    balance.assert_async().await;
}

#[tokio::test]
async fn head_of_chain_responses_are_not_cached() {
    let mut upstream = RpcMockBuilder::new().await;
    let _head = upstream.mock_block_number(1000).create_async().await;
    let balance = upstream
        .mock_method_with_body("eth_getBalance", r#"{"jsonrpc":"2.0","id":1,"result":"0x2"}"#)
        .expect(2)
        .create_async()
        .await;

    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;
    wait_for_height(&gateway, 1, 1000).await;

    let latest =
        r#"{"jsonrpc":"2.0","id":1,"method":"eth_getBalance","params":["0xabc","latest"]}"#;
    gateway.post_rpc(1, latest).await;
    gateway.post_rpc(1, latest).await;
    balance.assert_async().await;
}

#[tokio::test]
async fn error_replies_are_not_cached() {
    let mut upstream = RpcMockBuilder::new().await;
    let _head = upstream.mock_block_number(1000).create_async().await;
    let balance = upstream
        .mock_method_with_body(
            "eth_getBalance",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"pruned"}}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;
    wait_for_height(&gateway, 1, 1000).await;

    gateway.post_rpc(1, BALANCE_AT_BLOCK_16).await;
    gateway.post_rpc(1, BALANCE_AT_BLOCK_16).await;
    balance.assert_async().await;
}

#[tokio::test]
async fn denied_method_yields_a_500_with_the_policy_reason() {
    let upstream = RpcMockBuilder::new().await;
    let config = json!({
        "1": {
            "upstreams": [upstream.url()],
            "oldTrieUrl": "",
            "strategy": "NAIVE",
            "methodLimitationEnabled": true,
            "allowedMethods": ["eth_blockNumber"],
            "contractWhitelist": []
        }
    })
    .to_string();
    let gateway = spawn_gateway(&config).await;

    let (status, body) = gateway
        .post_rpc(1, r#"{"jsonrpc":"2.0","id":9,"method":"eth_getLogs","params":[{}]}"#)
        .await;
    assert_eq!(status, 500);
    assert!(body.contains("-32602"), "body: {body}");
    assert!(body.contains("DeniedMethod"), "body: {body}");
    // The client id is preserved in the error envelope.
    assert_eq!(parse_json(&body)["id"], json!(9));
}

#[tokio::test]
async fn unknown_and_malformed_chain_ids_are_rejected() {
    let upstream = RpcMockBuilder::new().await;
    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;

    let (status, _) = gateway.post_rpc(999, r#"{"method":"eth_blockNumber"}"#).await;
    assert_eq!(status, 400);

    let response = reqwest::Client::new()
        .post(format!("{}/http/not-a-chain", gateway.base_url))
        .body(r#"{"method":"eth_blockNumber"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn upstream_failure_becomes_a_json_rpc_error_envelope() {
    // Nothing listens on port 9; the transport error must surface as a
    // -32602 envelope with HTTP 500.
    let gateway = spawn_gateway(&chain_config(1, &["http://127.0.0.1:9"], "NAIVE")).await;

    let (status, body) =
        gateway.post_rpc(1, r#"{"jsonrpc":"2.0","id":3,"method":"eth_blockNumber"}"#).await;
    assert_eq!(status, 500);
    let parsed = parse_json(&body);
    assert_eq!(parsed["error"]["code"], json!(-32602));
    assert_eq!(parsed["id"], json!(3));
}

#[tokio::test]
async fn health_endpoint_reports_upstream_status() {
    let mut upstream = RpcMockBuilder::new().await;
    let _head = upstream.mock_block_number(1000).create_async().await;

    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;
    wait_for_height(&gateway, 1, 1000).await;

    let (status, body) = gateway.get("/health").await;
    assert_eq!(status, 200);
    let parsed = parse_json(&body);
    let nodes = parsed["1"].as_array().expect("chain 1 present");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["height"], json!(1000));
    assert_eq!(nodes[0]["isAlive"], json!(true));
    assert!(nodes[0]["rpcUrl"].as_str().unwrap().chars().count() <= 30);
}
