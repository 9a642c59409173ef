//! Chain registry.
//!
//! Builds and owns the per-chain runtime bundles (upstream pool, strategy,
//! access policy) for one loaded configuration, and runs the background
//! health sweep that measures upstream latency and reorders each pool.
//!
//! A [`RunningConfig`] is immutable once built; hot-reload builds a new one
//! and publishes it through [`ConfigHandle`] with an atomic swap, then
//! signals the old one's shutdown channel so its background tasks exit.

use std::{collections::HashMap, sync::Arc, time::Duration};

use ahash::AHashSet;
use arc_swap::ArcSwap;
use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};

use crate::{
    config::Config,
    errors::{ConfigError, GatewayError},
    request::Request,
    strategy::{self, Strategy, StrategyKind},
    upstream::{self, http, Upstream},
};

/// Interval between health sweep passes.
pub const HEALTH_SWEEP_INTERVAL: Duration = Duration::from_secs(120);
/// Pause between chains within one sweep pass.
pub const CHAIN_SWEEP_STAGGER: Duration = Duration::from_secs(10);

/// Runtime bundle for one chain.
pub struct ChainRuntime {
    pub chain_id: u64,
    /// Writer: the health sweep (reorders by latency). Readers: dispatch.
    upstreams: RwLock<Vec<Arc<dyn Upstream>>>,
    strategy: Box<dyn Strategy>,
    pub method_limitation_enabled: bool,
    pub allowed_methods: AHashSet<String>,
    pub allowed_contracts: AHashSet<String>,
}

impl ChainRuntime {
    /// A point-in-time copy of the upstream pool, taken under the read
    /// lock so it is serialized against the sweep's reorder.
    pub async fn snapshot(&self) -> Vec<Arc<dyn Upstream>> {
        self.upstreams.read().await.clone()
    }

    /// Routes one request through the chain's strategy.
    pub async fn dispatch(&self, req: Arc<Request>) -> Result<Bytes, GatewayError> {
        self.strategy.handle(self, req).await
    }

    /// One sweep pass: refresh every upstream concurrently, then sort the
    /// pool ascending by measured latency. Holds the writer lock for the
    /// whole pass.
    pub async fn sweep(&self) {
        let mut pool = self.upstreams.write().await;
        futures::future::join_all(pool.iter().map(|up| up.refresh_block_height())).await;
        pool.sort_by_key(|up| up.latency());
        tracing::info!(chain_id = self.chain_id, upstreams = pool.len(), "upstream pool refreshed");
    }
}

/// One built configuration: every chain's runtime plus the shutdown channel
/// for the background tasks spawned on its behalf.
pub struct RunningConfig {
    chains: HashMap<u64, Arc<ChainRuntime>>,
    shutdown: broadcast::Sender<()>,
}

impl RunningConfig {
    /// Builds the runtime from a parsed configuration and spawns its
    /// health sweep. Must run inside a tokio runtime (WebSocket upstreams
    /// spawn their connection loops here).
    ///
    /// # Errors
    ///
    /// Rejects chains with no upstreams, unknown strategy names, and
    /// strategy/upstream-count mismatches.
    pub fn build(cfg: &Config) -> Result<Arc<Self>, ConfigError> {
        let (shutdown, _) = broadcast::channel(4);
        let client = http::build_client()?;
        let mut chains = HashMap::new();

        for (&chain_id, chain_cfg) in cfg {
            if chain_cfg.upstreams.is_empty() {
                return Err(ConfigError::Validation(format!("chain {chain_id}: need upstreams")));
            }

            let mut pool: Vec<Arc<dyn Upstream>> = Vec::with_capacity(chain_cfg.upstreams.len());
            for url in &chain_cfg.upstreams {
                let old_trie_url = if chain_cfg.old_trie_url.is_empty() {
                    url
                } else {
                    &chain_cfg.old_trie_url
                };
                pool.push(upstream::build_upstream(
                    chain_id,
                    url,
                    old_trie_url,
                    &client,
                    &shutdown,
                )?);
            }

            let kind: StrategyKind = chain_cfg.strategy.parse()?;
            let strategy = strategy::build_strategy(kind, pool.len())
                .map_err(|e| ConfigError::Validation(format!("chain {chain_id}: {e}")))?;

            let allowed_methods: AHashSet<String> =
                chain_cfg.allowed_methods.iter().cloned().collect();
            let allowed_contracts: AHashSet<String> =
                chain_cfg.contract_whitelist.iter().map(|c| c.to_lowercase()).collect();

            chains.insert(
                chain_id,
                Arc::new(ChainRuntime {
                    chain_id,
                    upstreams: RwLock::new(pool),
                    strategy,
                    method_limitation_enabled: chain_cfg.method_limitation_enabled,
                    allowed_methods,
                    allowed_contracts,
                }),
            );
            tracing::info!(chain_id, strategy = %chain_cfg.strategy, "chain configured");
        }

        let running = Arc::new(Self { chains, shutdown });
        running.spawn_health_sweep();
        Ok(running)
    }

    #[must_use]
    pub fn chain(&self, chain_id: u64) -> Option<Arc<ChainRuntime>> {
        self.chains.get(&chain_id).cloned()
    }

    pub fn chains(&self) -> impl Iterator<Item = (u64, &Arc<ChainRuntime>)> {
        self.chains.iter().map(|(&id, chain)| (id, chain))
    }

    /// Signals every background task owned by this config to exit.
    pub fn close(&self) {
        let _ = self.shutdown.send(());
    }

    /// A receiver on this config's shutdown channel, for tasks spawned on
    /// its behalf outside the registry (e.g. the reload poller).
    #[must_use]
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    fn spawn_health_sweep(self: &Arc<Self>) {
        let chains: Vec<Arc<ChainRuntime>> = self.chains.values().cloned().collect();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::info!("health sweep started");
                        for chain in &chains {
                            chain.sweep().await;
                            tokio::select! {
                                _ = tokio::time::sleep(CHAIN_SWEEP_STAGGER) => {}
                                _ = shutdown_rx.recv() => return,
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("health sweep stopped");
                        return;
                    }
                }
            }
        });
    }
}

impl Drop for RunningConfig {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// Process-wide publication point for the current [`RunningConfig`].
pub struct ConfigHandle {
    inner: ArcSwap<RunningConfig>,
}

impl ConfigHandle {
    #[must_use]
    pub fn new(initial: Arc<RunningConfig>) -> Self {
        Self { inner: ArcSwap::new(initial) }
    }

    /// The currently published config. Callers hold the returned `Arc` for
    /// at most one request.
    #[must_use]
    pub fn load(&self) -> Arc<RunningConfig> {
        self.inner.load_full()
    }

    /// Atomically publishes `next` and cancels the replaced config's
    /// background tasks.
    pub fn replace(&self, next: Arc<RunningConfig>) {
        let old = self.inner.swap(next);
        old.close();
    }
}
