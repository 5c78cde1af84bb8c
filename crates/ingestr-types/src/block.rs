use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::EncodingError, BlockNumber};

/// A block, enriched with its per-transaction receipts, as cached and published
/// downstream.
///
/// `header`, `transactions`, and `receipts` are preserved verbatim as the RPC
/// node reported them, numbers and all, so we model them as JSON rather than
/// re-deriving a typed schema this crate has no business interpreting.
/// `encode`/`decode` round-trip byte-for-byte as a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedBlock {
    pub header: Value,
    pub hash: B256,
    pub transactions: Vec<Value>,
    pub receipts: Vec<Value>,
}

impl EnrichedBlock {
    /// Builds an enriched block, enforcing the `len(transactions) == len(receipts)`
    /// invariant.
    pub fn new(header: Value, hash: B256, transactions: Vec<Value>, receipts: Vec<Value>) -> Self {
        debug_assert_eq!(
            transactions.len(),
            receipts.len(),
            "every transaction must have exactly one receipt"
        );
        Self { header, hash, transactions, receipts }
    }

    /// Encodes this block to the compact wire form stored in the block cache.
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        serde_json::to_vec(self).map_err(EncodingError::Serialize)
    }

    /// Decodes a block previously produced by [`EnrichedBlock::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        serde_json::from_slice(bytes).map_err(EncodingError::Deserialize)
    }
}

/// The object-store / cache key for a block number: its plain decimal representation.
pub fn block_cache_key(number: BlockNumber) -> String {
    number.to_string()
}
