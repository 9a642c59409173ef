//! Upstream health snapshot.
//!
//! `GET /health` returns per-chain upstream status built from the getters
//! the health sweep keeps fresh. The snapshot itself is rebuilt on demand
//! but at most once per minute; in between, callers get the cached copy.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::Mutex, time::Instant};

use crate::registry::RunningConfig;

/// Minimum age before the snapshot is rebuilt.
pub const SNAPSHOT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// URLs are truncated so credentials embedded in provider paths never leave
/// the process.
const RPC_URL_DISPLAY_LEN: usize = 30;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub rpc_url: String,
    pub latency: String,
    pub height: u64,
    pub is_alive: bool,
}

/// Chain id → upstream status, in config order.
pub type HealthInfo = BTreeMap<u64, Vec<NodeInfo>>;

struct CachedSnapshot {
    info: Arc<HealthInfo>,
    refreshed_at: Option<Instant>,
}

/// On-demand, rate-limited health snapshot builder.
pub struct HealthReporter {
    cached: Mutex<CachedSnapshot>,
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(CachedSnapshot {
                info: Arc::new(BTreeMap::new()),
                refreshed_at: None,
            }),
        }
    }

    /// The current snapshot, rebuilt when older than
    /// [`SNAPSHOT_REFRESH_INTERVAL`].
    pub async fn snapshot(&self, running: &RunningConfig) -> Arc<HealthInfo> {
        let mut cached = self.cached.lock().await;
        let fresh = cached
            .refreshed_at
            .is_some_and(|at| at.elapsed() < SNAPSHOT_REFRESH_INTERVAL);
        if !fresh {
            cached.info = Arc::new(build_snapshot(running).await);
            cached.refreshed_at = Some(Instant::now());
        }
        Arc::clone(&cached.info)
    }
}

async fn build_snapshot(running: &RunningConfig) -> HealthInfo {
    let mut info = BTreeMap::new();
    for (chain_id, chain) in running.chains() {
        let mut nodes = Vec::new();
        for upstream in chain.snapshot().await {
            nodes.push(NodeInfo {
                rpc_url: upstream.rpc_url().chars().take(RPC_URL_DISPLAY_LEN).collect(),
                latency: format_latency(upstream.latency()),
                height: upstream.block_height(),
                is_alive: upstream.is_alive(),
            });
        }
        info.insert(chain_id, nodes);
    }
    info
}

fn format_latency(nanos: i64) -> String {
    let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
    format!("{:?}", Duration::from_nanos(nanos))
}
