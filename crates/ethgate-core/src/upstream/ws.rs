//! WebSocket upstream.
//!
//! Keeps one persistent connection per endpoint and multiplexes many
//! concurrent callers over it. Each in-flight request is assigned a fresh
//! server id (monotonically increasing, seeded from the Unix clock so ids
//! stay unique across reconnects), the envelope is rewritten with that id
//! on the wire, and replies are demultiplexed back to callers by matching
//! the id against the in-flight map. The client-facing reply gets the
//! original client id restored; the rewrite exists only between gateway
//! and upstream.
//!
//! The connection loop reconnects after 5 s on connect failure and
//! immediately after an established connection drops. A request whose
//! frame failed to write is answered with the socket error right away;
//! requests that were queued but not yet written when the connection died
//! time out from the caller side.

use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use super::{parse_block_height, Upstream, UpstreamError, DEAD_LATENCY};
use crate::request::Request;

/// Delay between reconnect attempts after a connect failure.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Deadline for getting a request onto the write queue.
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for the upstream's reply once enqueued.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Depth of the bounded request queue feeding the writer.
const REQUEST_QUEUE_DEPTH: usize = 64;

/// A request waiting to be written to the socket. The envelope has already
/// been rewritten with the server id; the reply slot lives in the in-flight
/// map, not here, so a dropped queue entry cannot strand a caller.
struct WsProxyRequest {
    id: i64,
    frame: String,
}

/// Minimal view of a reply frame: just the correlation id.
#[derive(Deserialize)]
struct WsProxyResponse {
    #[serde(default)]
    id: i64,
}

enum ConnExit {
    Dropped,
    Shutdown,
}

pub struct WsUpstream {
    chain_id: u64,
    url: String,
    request_tx: mpsc::Sender<WsProxyRequest>,
    next_id: AtomicI64,
    /// Reply slots by server id. A slot resolves to the raw reply body, or
    /// to the socket error that killed the frame's write.
    inflight: DashMap<i64, oneshot::Sender<Result<Bytes, UpstreamError>>>,
    block_height: AtomicU64,
    latency: AtomicI64,
}

impl WsUpstream {
    /// Creates the upstream and spawns its connection loop. The loop exits
    /// when `shutdown` fires.
    #[must_use]
    pub fn spawn(chain_id: u64, url: String, shutdown: &broadcast::Sender<()>) -> Arc<Self> {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let upstream = Arc::new(Self {
            chain_id,
            url,
            request_tx,
            next_id: AtomicI64::new(Utc::now().timestamp()),
            inflight: DashMap::new(),
            block_height: AtomicU64::new(0),
            latency: AtomicI64::new(0),
        });

        tokio::spawn(Arc::clone(&upstream).run(request_rx, shutdown.subscribe()));
        upstream
    }

    async fn run(
        self: Arc<Self>,
        mut request_rx: mpsc::Receiver<WsProxyRequest>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tracing::debug!(url = %self.url, "ws upstream loop started");
        loop {
            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = shutdown_rx.recv() => break,
            };

            match connected {
                Ok((stream, _)) => {
                    tracing::info!(url = %self.url, "ws upstream connected");
                    match self.run_conn(stream, &mut request_rx, &mut shutdown_rx).await {
                        ConnExit::Shutdown => break,
                        // Reconnect immediately after a dropped connection.
                        ConnExit::Dropped => {
                            tracing::warn!(url = %self.url, "ws upstream disconnected, reconnecting");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        url = %self.url,
                        error = %e,
                        retry_secs = CONNECT_RETRY_DELAY.as_secs(),
                        "ws upstream connect failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(CONNECT_RETRY_DELAY) => {}
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }
        }
        tracing::debug!(url = %self.url, "ws upstream loop exited");
    }

    /// Drives one established connection: writes queued requests, reads
    /// and demultiplexes replies. Returns when the socket dies or shutdown
    /// fires.
    async fn run_conn(
        &self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        request_rx: &mut mpsc::Receiver<WsProxyRequest>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> ConnExit {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                queued = request_rx.recv() => {
                    let Some(proxy) = queued else {
                        // All senders gone: the upstream itself was dropped.
                        return ConnExit::Shutdown;
                    };
                    tracing::trace!(url = %self.url, proxy_id = proxy.id, "writing ws frame");
                    if let Err(e) = sink.send(Message::text(proxy.frame)).await {
                        tracing::error!(url = %self.url, error = %e, "ws write failed");
                        // The frame never made it out; tell its caller
                        // rather than leaving it to the reply deadline.
                        if let Some((_, reply_tx)) = self.inflight.remove(&proxy.id) {
                            let _ = reply_tx.send(Err(UpstreamError::WebSocket(e.to_string())));
                        }
                        return ConnExit::Dropped;
                    }
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.deliver(Bytes::from(text.to_string()));
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return ConnExit::Dropped;
                        }
                        Some(Ok(other)) => {
                            tracing::debug!(url = %self.url, "skipping non-text ws frame: {other:?}");
                        }
                        Some(Err(e)) => {
                            tracing::error!(url = %self.url, error = %e, "ws read failed");
                            return ConnExit::Dropped;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    return ConnExit::Shutdown;
                }
            }
        }
    }

    /// Routes a reply frame to the caller registered under its id.
    fn deliver(&self, body: Bytes) {
        let id = serde_json::from_slice::<WsProxyResponse>(&body).map(|r| r.id).unwrap_or_default();
        if let Some((_, reply_tx)) = self.inflight.remove(&id) {
            // A closed receiver means the caller already timed out.
            let _ = reply_tx.send(Ok(body));
        } else {
            tracing::debug!(url = %self.url, proxy_id = id, "ws frame with no matching request");
        }
    }
}

#[async_trait]
impl Upstream for WsUpstream {
    async fn handle(&self, req: &Request) -> Result<Bytes, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let mut data = req.data.clone();
        data.id = Value::from(id);
        let frame = serde_json::to_string(&data)
            .map_err(|e| UpstreamError::Connection(format!("frame serialization failed: {e}")))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inflight.insert(id, reply_tx);
        tracing::debug!(
            log_id = %req.log_id,
            method = %req.data.method,
            url = %self.url,
            proxy_id = id,
            "dispatching to ws upstream"
        );

        // Fast path first, so a backed-up writer queue is reported as
        // QueueFull instead of blending into the generic timeout.
        match self.request_tx.try_send(WsProxyRequest { id, frame }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inflight.remove(&id);
                return Err(UpstreamError::ChannelClosed);
            }
            Err(mpsc::error::TrySendError::Full(proxy)) => {
                match timeout(ENQUEUE_TIMEOUT, self.request_tx.send(proxy)).await {
                    Err(_) => {
                        self.inflight.remove(&id);
                        return Err(UpstreamError::QueueFull);
                    }
                    Ok(Err(_)) => {
                        self.inflight.remove(&id);
                        return Err(UpstreamError::ChannelClosed);
                    }
                    Ok(Ok(())) => {}
                }
            }
        }

        let reply = timeout(REPLY_TIMEOUT, reply_rx).await;
        self.inflight.remove(&id);
        match reply {
            Err(_) => Err(UpstreamError::Timeout),
            Ok(Err(_)) => Err(UpstreamError::ChannelClosed),
            Ok(Ok(Ok(body))) => Ok(restore_client_id(body, &req.data.id)),
            Ok(Ok(Err(e))) => Err(e),
        }
    }

    async fn refresh_block_height(&self) {
        let probe = Request::block_number_probe(self.chain_id);
        let start = Instant::now();
        match self.handle(&probe).await {
            Ok(body) => {
                let elapsed = i64::try_from(start.elapsed().as_nanos()).unwrap_or(DEAD_LATENCY);
                self.latency.store(elapsed, Ordering::Relaxed);
                let height = parse_block_height(&body).unwrap_or(0);
                self.block_height.store(height, Ordering::Relaxed);
                tracing::debug!(url = %self.url, height, latency_ns = elapsed, "refreshed upstream height");
            }
            Err(e) => {
                self.latency.store(DEAD_LATENCY, Ordering::Relaxed);
                self.block_height.store(0, Ordering::Relaxed);
                tracing::warn!(url = %self.url, error = %e, "upstream height probe failed");
            }
        }
    }

    fn rpc_url(&self) -> &str {
        &self.url
    }

    fn block_height(&self) -> u64 {
        self.block_height.load(Ordering::Relaxed)
    }

    fn latency(&self) -> i64 {
        self.latency.load(Ordering::Relaxed)
    }
}

/// Swaps the server-assigned id in a reply body back to the client's id.
/// Bodies that do not parse as JSON objects pass through untouched.
fn restore_client_id(body: Bytes, client_id: &Value) -> Bytes {
    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(mut map)) => {
            map.insert("id".to_string(), client_id.clone());
            Bytes::from(Value::Object(map).to_string())
        }
        _ => body,
    }
}
