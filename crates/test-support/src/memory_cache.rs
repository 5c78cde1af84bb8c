use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ingestr_cache::{BlockCache, CacheError};
use ingestr_types::BlockNumber;

use crate::events::EventLog;

/// In-memory stand-in for [`ingestr_cache::S3BlockCache`].
#[derive(Default)]
pub struct MemoryBlockCache {
    store: Mutex<HashMap<BlockNumber, Vec<u8>>>,
    events: Option<Arc<EventLog>>,
}

impl MemoryBlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Arc<EventLog>) -> Self {
        Self { store: Mutex::new(HashMap::new()), events: Some(events) }
    }

    /// Seeds a hit for `block_number` without going through `store_block`,
    /// for cache-hit-path tests.
    pub fn seed(&self, block_number: BlockNumber, bytes: Vec<u8>) {
        self.store.lock().expect("poisoned").insert(block_number, bytes);
    }

    pub fn contains(&self, block_number: BlockNumber) -> bool {
        self.store.lock().expect("poisoned").contains_key(&block_number)
    }
}

#[async_trait]
impl BlockCache for MemoryBlockCache {
    async fn get_block(&self, block_number: BlockNumber) -> Result<Vec<u8>, CacheError> {
        self.store
            .lock()
            .expect("poisoned")
            .get(&block_number)
            .cloned()
            .ok_or(CacheError::NotFound(block_number))
    }

    async fn store_block(&self, block_number: BlockNumber, bytes: &[u8]) -> Result<(), CacheError> {
        self.store.lock().expect("poisoned").insert(block_number, bytes.to_vec());
        if let Some(events) = &self.events {
            events.record(format!("store:{block_number}"));
        }
        Ok(())
    }
}
