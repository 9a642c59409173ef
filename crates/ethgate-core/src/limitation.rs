//! Access policy.
//!
//! When a chain has method limitation enabled, every request must name an
//! allowed method, and the two methods that can reach arbitrary contracts
//! (`eth_call` and `eth_sendRawTransaction`) must target a whitelisted
//! address. Raw transactions are decoded from their signed RLP form to
//! extract the `to` address; whitelist comparison is lowercased on both
//! sides.

use alloy_consensus::{transaction::Transaction as _, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use serde_json::Value;
use thiserror::Error;

use crate::{registry::ChainRuntime, types::JsonRpcRequest};

/// Access-policy rejections. Display strings are the wire-visible reason
/// carried in the JSON-RPC error envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("DeniedMethod")]
    DeniedMethod,

    #[error("DeniedContract")]
    DeniedContract,

    #[error("DecodeError: {0}")]
    Decode(String),
}

/// Validates one call against the chain's access policy.
///
/// # Errors
///
/// - [`PolicyError::DeniedMethod`] when the method is not allow-listed.
/// - [`PolicyError::DeniedContract`] when the target contract is not
///   whitelisted.
/// - [`PolicyError::Decode`] when the target cannot be extracted from the
///   params.
pub fn validate_call(chain: &ChainRuntime, data: &JsonRpcRequest) -> Result<(), PolicyError> {
    if !chain.method_limitation_enabled {
        return Ok(());
    }

    if !chain.allowed_methods.contains(&data.method) {
        return Err(PolicyError::DeniedMethod);
    }

    match data.method.as_str() {
        "eth_call" => {
            let to = call_target(&data.params)?;
            check_whitelist(chain, &to)
        }
        "eth_sendRawTransaction" => {
            let to = raw_transaction_target(&data.params)?;
            check_whitelist(chain, &to)
        }
        _ => Ok(()),
    }
}

fn check_whitelist(chain: &ChainRuntime, to: &str) -> Result<(), PolicyError> {
    if chain.allowed_contracts.contains(&to.to_lowercase()) {
        Ok(())
    } else {
        Err(PolicyError::DeniedContract)
    }
}

/// Extracts `params[0].to` from an `eth_call`.
fn call_target(params: &[Value]) -> Result<String, PolicyError> {
    params
        .first()
        .and_then(|call| call.get("to"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PolicyError::Decode("eth_call target missing".to_string()))
}

/// Decodes `params[0]` as a signed transaction and extracts its `to`
/// address. Contract creations carry no `to` and are rejected as
/// undecodable targets.
fn raw_transaction_target(params: &[Value]) -> Result<String, PolicyError> {
    let raw = params
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| PolicyError::Decode("raw transaction missing".to_string()))?;

    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| PolicyError::Decode(format!("invalid hex: {e}")))?;

    let envelope = TxEnvelope::decode_2718(&mut bytes.as_slice())
        .map_err(|e| PolicyError::Decode(format!("invalid transaction rlp: {e}")))?;

    let to = envelope
        .to()
        .ok_or_else(|| PolicyError::Decode("contract creation has no target".to_string()))?;

    Ok(format!("0x{to:x}"))
}
