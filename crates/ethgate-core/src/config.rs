//! Configuration file model and hot-reload poller.
//!
//! The gateway reads a JSON file mapping chain ids to chain configs:
//!
//! ```json
//! {
//!   "1": {
//!     "upstreams": ["https://rpc.example.com"],
//!     "oldTrieUrl": "",
//!     "strategy": "NAIVE",
//!     "methodLimitationEnabled": false,
//!     "allowedMethods": ["eth_blockNumber"],
//!     "contractWhitelist": []
//!   }
//! }
//! ```
//!
//! The file is re-read every 3 seconds. A content-hash match is a no-op;
//! a change rebuilds the running config and publishes it atomically. After
//! the first successful load, read/parse/build failures keep the previous
//! config and log a warning.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::{
    errors::ConfigError,
    registry::{ConfigHandle, RunningConfig},
};

/// Default path of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";
/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "ETHGATE_CONFIG";
/// How often the poller re-reads the file.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(3);

/// Chain id → chain config. A `BTreeMap` keeps iteration (and therefore
/// build order and log output) deterministic.
pub type Config = BTreeMap<u64, ChainConfig>;

/// Configuration for one chain, as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Upstream endpoint URLs; `http(s)` or `ws(s)` schemes. At least one.
    pub upstreams: Vec<String>,
    /// Dedicated archive-node URL; empty means "same as the primary".
    #[serde(default)]
    pub old_trie_url: String,
    /// `NAIVE` | `RACE` | `FALLBACK` | `BALANCING`.
    pub strategy: String,
    #[serde(default)]
    pub method_limitation_enabled: bool,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// Compared lowercased.
    #[serde(default)]
    pub contract_whitelist: Vec<String>,
}

/// Parses the configuration file contents.
///
/// # Errors
///
/// Returns a parse error for malformed JSON or a schema mismatch.
pub fn parse(bytes: &[u8]) -> Result<Config, ConfigError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Resolves the config file path from the environment, falling back to
/// [`DEFAULT_CONFIG_PATH`].
#[must_use]
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV).map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Loads the file, builds the initial running config, and returns it with
/// the content digest the poller diffs against.
///
/// # Errors
///
/// Any failure here is fatal: the gateway cannot start without a valid
/// configuration.
pub fn load_initial(path: &Path) -> Result<(Arc<RunningConfig>, [u8; 32]), ConfigError> {
    let bytes = std::fs::read(path)?;
    let cfg = parse(&bytes)?;
    let running = RunningConfig::build(&cfg)?;
    Ok((running, digest(&bytes)))
}

/// Spawns the reload poller. Every `interval` it re-reads the file; on a
/// digest change it rebuilds and publishes through `handle`. The task runs
/// for the lifetime of the process (reload outlives individual configs).
pub fn spawn_reload_task(
    path: PathBuf,
    handle: Arc<ConfigHandle>,
    mut last_digest: [u8; 32],
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the immediate first tick; initial load already happened

        loop {
            ticker.tick().await;

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config re-read failed, keeping previous config");
                    continue;
                }
            };

            let current = digest(&bytes);
            if current == last_digest {
                continue;
            }

            match parse(&bytes).and_then(|cfg| RunningConfig::build(&cfg)) {
                Ok(next) => {
                    handle.replace(next);
                    last_digest = current;
                    tracing::info!(path = %path.display(), "configuration reloaded");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config rebuild failed, keeping previous config");
                }
            }
        }
    })
}
