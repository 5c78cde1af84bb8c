use std::{
    collections::HashMap,
    sync::Mutex,
};

use alloy::primitives::B256;
use async_trait::async_trait;
use ingestr_chain::{ChainClient, ChainError, FetchedBlock};
use ingestr_types::BlockNumber;
use serde_json::Value;

/// In-memory stand-in for [`ingestr_chain::AlloyChainClient`]. Blocks and
/// receipts are seeded ahead of time; fetches for anything unseeded fail the
/// way a real node would report "not found".
#[derive(Default)]
pub struct MemoryChainClient {
    blocks: Mutex<HashMap<BlockNumber, FetchedBlock>>,
    receipts: Mutex<HashMap<B256, Value>>,
}

impl MemoryChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_block(&self, number: BlockNumber, block: FetchedBlock) {
        self.blocks.lock().expect("poisoned").insert(number, block);
    }

    pub fn seed_receipt(&self, tx_hash: B256, receipt: Value) {
        self.receipts.lock().expect("poisoned").insert(tx_hash, receipt);
    }
}

#[async_trait]
impl ChainClient for MemoryChainClient {
    async fn fetch_block(&self, number: BlockNumber) -> Result<FetchedBlock, ChainError> {
        self.blocks.lock().expect("poisoned").get(&number).cloned().ok_or(ChainError::BlockNotFound(number))
    }

    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Value, ChainError> {
        self.receipts
            .lock()
            .expect("poisoned")
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("no seeded receipt for {tx_hash}").into()))
    }
}
