//! Single-upstream passthrough.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::Strategy;
use crate::{errors::GatewayError, registry::ChainRuntime, request::Request};

/// Delegates directly to the chain's only upstream. Construction is
/// validated against the upstream count, so the pool always has exactly
/// one entry here.
pub struct NaiveStrategy;

#[async_trait]
impl Strategy for NaiveStrategy {
    async fn handle(
        &self,
        chain: &ChainRuntime,
        req: Arc<Request>,
    ) -> Result<Bytes, GatewayError> {
        let upstream = chain
            .snapshot()
            .await
            .into_iter()
            .next()
            .ok_or(GatewayError::NoValidUpstream)?;
        Ok(upstream.handle(&req).await?)
    }
}
