//! Archive classification.
//!
//! Decides whether a request addresses historical ("archive") chain state.
//! Archive responses describe blocks more than [`ARCHIVE_DEPTH`] behind the
//! upstream's head; they are immutable, which makes them safe to cache and
//! eligible for routing to a dedicated archive node.
//!
//! Rules are evaluated in order, first match wins. Anything the classifier
//! does not recognize is treated as archive: an unknown method is more
//! likely a trace/debug namespace call than a head-of-chain read, and a
//! wrong `true` only costs a detour to the archive URL plus a cache entry
//! that is never invalidated but also never wrong for the exact params.

use serde_json::Value;

use crate::{
    block_param::{BlockParam, BlockTag},
    types::JsonRpcRequest,
};

/// Blocks behind head beyond which state counts as archive data.
pub const ARCHIVE_DEPTH: u64 = 100;

/// Methods that always address historical or subscription state.
const ALWAYS_ARCHIVE: &[&str] = &[
    "eth_subscribe",
    "eth_unsubscribe",
    "trace_block",
    "trace_call",
    "trace_callMany",
    "trace_filter",
    "trace_transaction",
    "eth_chainId",
];

/// Methods whose third parameter is the block reference.
const BLOCK_IN_THIRD_PARAM: &[&str] = &["eth_getProof", "eth_getStorageAt"];

/// Methods whose second parameter is the block reference.
const BLOCK_IN_SECOND_PARAM: &[&str] = &[
    "eth_call",
    "eth_createAccessList",
    "eth_estimateGas",
    "eth_feeHistory",
    "eth_getBalance",
    "eth_getCode",
    "eth_getTransactionCount",
];

/// Block-by-number family: the first parameter is the block reference.
const BLOCK_IN_FIRST_PARAM: &[&str] = &[
    "eth_getBlockByNumber",
    "eth_getBlockReceipts",
    "eth_getBlockTransactionCountByNumber",
    "eth_getUncleByBlockNumberAndIndex",
    "eth_getUncleCountByBlockNumber",
    "eth_getTransactionByBlockNumberAndIndex",
];

/// Classifies a request against the given head height.
///
/// Pure function of `(request, head)`. When `head` is zero (unknown), the
/// block-parameter rules degrade to "not archive" while the archive-by-
/// default categories still return `true`.
#[must_use]
pub fn is_archive_request(data: &JsonRpcRequest, head: u64) -> bool {
    let method = data.method.as_str();

    if method == "eth_blockNumber" {
        return false;
    }
    if ALWAYS_ARCHIVE.contains(&method) {
        return true;
    }
    if BLOCK_IN_THIRD_PARAM.contains(&method) {
        return data.params.len() >= 3 && is_past_block(&data.params[2], head);
    }
    if BLOCK_IN_SECOND_PARAM.contains(&method) {
        return data.params.len() >= 2 && is_past_block(&data.params[1], head);
    }
    if BLOCK_IN_FIRST_PARAM.contains(&method) {
        return !data.params.is_empty() && is_past_block(&data.params[0], head);
    }
    if method == "eth_getLogs" {
        return true;
    }

    true
}

/// The past-block predicate: `"latest"`/`"pending"` (and the other tags)
/// are never past; a concrete number `n` is past iff `head - n > 100`.
/// Missing or unparseable parameters are never past.
fn is_past_block(param: &Value, head: u64) -> bool {
    match BlockParam::from_value(param) {
        Some(BlockParam::Tag(BlockTag::Latest | BlockTag::Pending)) => false,
        Some(BlockParam::Tag(_)) => false,
        Some(BlockParam::Number(n)) => head.saturating_sub(n) > ARCHIVE_DEPTH,
        None => false,
    }
}
