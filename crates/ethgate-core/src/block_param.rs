//! Block parameter parsing.
//!
//! Ethereum JSON-RPC methods accept a "default block" parameter that is
//! either a tag (`"latest"`, `"pending"`, ...) or a block number encoded as
//! a hex or decimal string (or, from sloppy clients, a bare JSON number).
//! The archive classifier needs one consistent reading of all of these.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// A block reference: either a concrete number or a named tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockParam {
    Number(u64),
    Tag(BlockTag),
}

/// Standard Ethereum block tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
}

impl BlockParam {
    /// Parses a block parameter from its string form.
    ///
    /// Accepts tags, `0x`-prefixed hex, bare hex-less decimal, and (for
    /// compatibility with permissive clients) un-prefixed hex via the
    /// decimal path failing over.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` when the input is neither a tag nor a number.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        match s {
            "latest" => Ok(Self::Tag(BlockTag::Latest)),
            "earliest" => Ok(Self::Tag(BlockTag::Earliest)),
            "pending" => Ok(Self::Tag(BlockTag::Pending)),
            "safe" => Ok(Self::Tag(BlockTag::Safe)),
            "finalized" => Ok(Self::Tag(BlockTag::Finalized)),
            s => {
                if let Some(hex) = s.strip_prefix("0x") {
                    u64::from_str_radix(hex, 16)
                        .map(Self::Number)
                        .map_err(|_| ParseError::InvalidHex(s.to_string()))
                } else {
                    s.parse::<u64>()
                        .map(Self::Number)
                        .map_err(|_| ParseError::InvalidNumber(s.to_string()))
                }
            }
        }
    }

    /// Reads a block parameter out of a JSON value. Strings go through
    /// [`BlockParam::parse`]; bare numbers are taken as block numbers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s).ok(),
            Value::Number(n) => n.as_u64().map(Self::Number),
            _ => None,
        }
    }

    /// The concrete block number, if this is not a tag.
    #[must_use]
    pub fn as_number(self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(n),
            Self::Tag(_) => None,
        }
    }
}

/// Parses a hex quantity like `"0x10"` into a `u64`, tolerating a missing
/// prefix. Used for `eth_blockNumber` results.
#[must_use]
pub fn parse_hex_quantity(s: &str) -> Option<u64> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse::<u64>().ok()
    }
}
