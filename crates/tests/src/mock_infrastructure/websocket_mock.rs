//! Mock WebSocket upstream.
//!
//! Accepts connections, records every text frame it receives, and answers
//! each one with a JSON-RPC success that echoes the frame's `id`. That is
//! exactly enough to observe the gateway's id remapping from the outside.

use std::{net::SocketAddr, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct EchoWsServer {
    addr: SocketAddr,
    received: Arc<RwLock<Vec<String>>>,
    _server: JoinHandle<()>,
}

impl EchoWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock ws server");
        let addr = listener.local_addr().expect("mock ws server addr");
        let received = Arc::new(RwLock::new(Vec::new()));

        let received_clone = Arc::clone(&received);
        let server = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                tokio::spawn(handle_connection(stream, Arc::clone(&received_clone)));
            }
        });

        Self { addr, received, _server: server }
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Every text frame received so far, in arrival order.
    pub async fn received_frames(&self) -> Vec<String> {
        self.received.read().await.clone()
    }
}

async fn handle_connection(stream: TcpStream, received: Arc<RwLock<Vec<String>>>) {
    let Ok(ws) = accept_async(stream).await else { return };
    let (mut write, mut read) = ws.split();

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                received.write().await.push(text.to_string());

                let id = serde_json::from_str::<Value>(text.as_str())
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                let reply = json!({"jsonrpc": "2.0", "id": id, "result": "0x2a"}).to_string();
                if write.send(Message::text(reply)).await.is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
