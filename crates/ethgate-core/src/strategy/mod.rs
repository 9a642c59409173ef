//! Dispatch strategies.
//!
//! A strategy coordinates one logical request across the chain's upstream
//! pool. All strategies share one invariant: exactly one response is
//! returned to the client per call, either a byte body from an upstream or
//! a terminal error.

mod fallback;
mod naive;
mod race;

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    errors::{ConfigError, GatewayError},
    registry::ChainRuntime,
    request::Request,
};

pub use fallback::{BalancingStrategy, FallbackStrategy, FALLBACK_COOL_OFF};
pub use naive::NaiveStrategy;
pub use race::{RaceStrategy, RACE_DEADLINE};

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn handle(
        &self,
        chain: &ChainRuntime,
        req: Arc<Request>,
    ) -> Result<Bytes, GatewayError>;
}

/// The four configured strategy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Naive,
    Race,
    Fallback,
    Balancing,
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NAIVE" => Ok(Self::Naive),
            "RACE" => Ok(Self::Race),
            "FALLBACK" => Ok(Self::Fallback),
            "BALANCING" => Ok(Self::Balancing),
            other => {
                Err(ConfigError::Validation(format!("blank or unsupported strategy: {other}")))
            }
        }
    }
}

/// Builds a strategy instance, validating it against the upstream count.
///
/// # Errors
///
/// `NAIVE` requires exactly one upstream; the other strategies require at
/// least two.
pub fn build_strategy(
    kind: StrategyKind,
    upstream_count: usize,
) -> Result<Box<dyn Strategy>, ConfigError> {
    match kind {
        StrategyKind::Naive => {
            if upstream_count != 1 {
                return Err(ConfigError::Validation(
                    "naive strategy requires exactly 1 upstream".to_string(),
                ));
            }
            Ok(Box::new(NaiveStrategy))
        }
        StrategyKind::Race => {
            if upstream_count < 2 {
                return Err(ConfigError::Validation(
                    "race strategy requires more than 1 upstream".to_string(),
                ));
            }
            Ok(Box::new(RaceStrategy))
        }
        StrategyKind::Fallback => {
            if upstream_count < 2 {
                return Err(ConfigError::Validation(
                    "fallback strategy requires more than 1 upstream".to_string(),
                ));
            }
            Ok(Box::new(FallbackStrategy::new(upstream_count)))
        }
        StrategyKind::Balancing => {
            if upstream_count < 2 {
                return Err(ConfigError::Validation(
                    "balancing strategy requires more than 1 upstream".to_string(),
                ));
            }
            Ok(Box::new(BalancingStrategy::new(upstream_count)))
        }
    }
}
