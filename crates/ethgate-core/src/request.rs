//! The in-flight request.
//!
//! One [`Request`] is built per inbound JSON-RPC exchange and shared across
//! whatever tasks the dispatch strategy fans out to, so the archive bit
//! lives in an atomic: the classifier runs during dispatch (each HTTP
//! upstream classifies against its own head height) and the gateway reads
//! the bit afterwards to decide cache admission.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;

use crate::{archive, types::JsonRpcRequest};

/// Length of the random correlation token attached to every request.
const LOG_ID_LEN: usize = 8;

/// A single client request travelling through the gateway.
#[derive(Debug)]
pub struct Request {
    pub chain_id: u64,
    /// The raw body as received; passed through to HTTP upstreams unchanged.
    pub req_bytes: Bytes,
    /// The parsed envelope. Bodies that fail to parse yield the default
    /// envelope (empty method) and are rejected by the access policy or the
    /// upstream, never by the gateway itself.
    pub data: JsonRpcRequest,
    /// Correlation id for log lines.
    pub log_id: String,
    is_archive: AtomicBool,
}

impl Request {
    #[must_use]
    pub fn new(chain_id: u64, body: Bytes) -> Self {
        let data: JsonRpcRequest = serde_json::from_slice(&body).unwrap_or_default();
        Self {
            chain_id,
            req_bytes: body,
            data,
            log_id: random_log_id(),
            is_archive: AtomicBool::new(false),
        }
    }

    /// Builds the `eth_blockNumber` probe used by health refreshes.
    /// The id is the current Unix second, which keeps probe replies easy to
    /// spot in upstream logs.
    #[must_use]
    pub fn block_number_probe(chain_id: u64) -> Self {
        let data = JsonRpcRequest::new("eth_blockNumber", vec![], json!(Utc::now().timestamp()));
        let body = serde_json::to_vec(&data).unwrap_or_default();
        Self {
            chain_id,
            req_bytes: Bytes::from(body),
            data,
            log_id: random_log_id(),
            is_archive: AtomicBool::new(false),
        }
    }

    /// Classifies this request against `head`, caching the verdict on the
    /// request. Returns the verdict.
    pub fn classify(&self, head: u64) -> bool {
        let archive = archive::is_archive_request(&self.data, head);
        self.is_archive.store(archive, Ordering::Relaxed);
        archive
    }

    /// The last classification verdict (false until classified).
    #[must_use]
    pub fn is_archive(&self) -> bool {
        self.is_archive.load(Ordering::Relaxed)
    }
}

fn random_log_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LOG_ID_LEN)
        .map(char::from)
        .collect()
}
