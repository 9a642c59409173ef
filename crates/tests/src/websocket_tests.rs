//! WebSocket sessions end to end: gateway `/ws/{chainId}` in front of a
//! WebSocket upstream.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::mock_infrastructure::{chain_config, parse_json, spawn_gateway, EchoWsServer};

#[tokio::test]
async fn ws_request_ids_are_remapped_upstream_and_restored_for_the_client() {
    let upstream = EchoWsServer::start().await;
    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;

    let (mut session, _) = connect_async(gateway.ws_url(1)).await.expect("ws upgrade");
    session
        .send(Message::text(
            r#"{"jsonrpc":"2.0","id":42,"method":"eth_getTransactionCount","params":["0xabc","latest"]}"#,
        ))
        .await
        .unwrap();

    // The client sees its own id back.
    let reply = session.next().await.expect("reply frame").expect("ws read");
    let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["id"], json!(42));
    assert_eq!(reply["result"], json!("0x2a"));

    // The upstream saw a rewritten, server-assigned id instead.
    let frames = upstream.received_frames().await;
    let sent = frames
        .iter()
        .map(|f| parse_json(f))
        .find(|f| f["method"] == json!("eth_getTransactionCount"))
        .expect("upstream received the call");
    let upstream_id = sent["id"].as_i64().expect("integer proxy id");
    assert_ne!(upstream_id, 42);
    // Ids are seeded from the Unix clock.
    assert!(upstream_id > 1_000_000_000, "unexpected proxy id {upstream_id}");
}

#[tokio::test]
async fn ws_session_answers_frames_in_order() {
    let upstream = EchoWsServer::start().await;
    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;

    let (mut session, _) = connect_async(gateway.ws_url(1)).await.expect("ws upgrade");
    for id in [7, 8, 9] {
        session
            .send(Message::text(
                json!({"jsonrpc": "2.0", "id": id, "method": "eth_blockNumber", "params": []})
                    .to_string(),
            ))
            .await
            .unwrap();
    }

    for expected in [7, 8, 9] {
        let reply = session.next().await.expect("reply frame").expect("ws read");
        let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply["id"], json!(expected));
    }
}

#[tokio::test]
async fn ws_upgrade_with_a_bad_chain_id_is_rejected() {
    let upstream = EchoWsServer::start().await;
    let gateway = spawn_gateway(&chain_config(1, &[&upstream.url()], "NAIVE")).await;

    let url = format!("{}/ws/not-a-chain", gateway.base_url.replace("http://", "ws://"));
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn unreachable_ws_upstream_times_out_with_an_error_envelope() {
    // The upstream never connects; the call sits in the queue until the
    // reply deadline and surfaces as a timeout envelope over HTTP.
    let gateway = spawn_gateway(&chain_config(1, &["ws://127.0.0.1:9"], "NAIVE")).await;

    let (status, body) =
        gateway.post_rpc(1, r#"{"jsonrpc":"2.0","id":5,"method":"eth_blockNumber"}"#).await;
    assert_eq!(status, 500);
    assert!(body.contains("timeout error"), "body: {body}");
    assert_eq!(parse_json(&body)["id"], json!(5));
}
