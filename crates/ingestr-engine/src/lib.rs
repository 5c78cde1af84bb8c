//! The Ingest Engine: the main control loop. Computes the allowed-work
//! horizon from the Tip Tracker's latest height, claims work from the
//! Coordination Store Client, and runs the per-block pipeline
//! (cache-lookup → fetch+enrich → publish → cache-store → retire) under a
//! bounded concurrency semaphore.

mod engine;
mod error;
mod pipeline;

pub use engine::{Engine, EngineParams};
pub use error::EngineError;
pub use pipeline::run_block_task;

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use alloy::primitives::B256;
    use ingestr_chain::FetchedBlock;
    use ingestr_test_support::{EventLog, MemoryBlockCache, MemoryChainClient, MemoryCoordinator, MemoryNotifier};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;

    // S5 - cache-hit path.
    #[tokio::test]
    async fn cache_hit_publishes_once_skips_store_and_retires() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let cache = Arc::new(MemoryBlockCache::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let chain = Arc::new(MemoryChainClient::new());

        cache.seed(42, b"cached-bytes".to_vec());

        run_block_task(42, coordinator.clone(), cache.clone(), notifier.clone(), chain).await;

        assert_eq!(notifier.published(), vec![42]);
        assert!(!cache.contains(43), "a hit must not trigger a redundant store");
        assert_eq!(coordinator.last_finished(), Some(42), "retire always runs once publish and store succeed");
    }

    // S6 - cache-miss path: fetch, enrich, publish, store, retire, and the
    // stored blob decodes back to the assembled enriched block.
    #[tokio::test]
    async fn cache_miss_fetches_enriches_publishes_stores_and_retires() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let cache = Arc::new(MemoryBlockCache::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let chain = Arc::new(MemoryChainClient::new());

        let tx_hash_a = B256::repeat_byte(0x01);
        let tx_hash_b = B256::repeat_byte(0x02);
        let header = json!({ "number": "0x64", "hash": "0xabc" });
        let hash = B256::repeat_byte(0xAB);
        let transactions = vec![json!({ "hash": format!("{tx_hash_a}") }), json!({ "hash": format!("{tx_hash_b}") })];

        chain.seed_block(100, FetchedBlock { header, hash, transactions });
        chain.seed_receipt(tx_hash_a, json!({ "status": "0x1", "transactionIndex": 0 }));
        chain.seed_receipt(tx_hash_b, json!({ "status": "0x1", "transactionIndex": 1 }));

        // The block must actually be claimed for retire_block to have
        // anything to remove.
        let claimed = coordinator.claim_next_block(100, 10, 100).await.unwrap();
        assert_eq!(claimed, Some(100));

        run_block_task(100, coordinator.clone(), cache.clone(), notifier.clone(), chain).await;

        assert_eq!(notifier.published(), vec![100]);
        assert!(cache.contains(100));
        assert_eq!(coordinator.last_finished(), Some(100));
        assert!(coordinator.block_set_members().is_empty());

        let stored = cache.get_block(100).await.expect("stored block should be present");
        let decoded = ingestr_types::EnrichedBlock::decode(&stored).expect("decode stored bytes");
        assert_eq!(decoded.transactions.len(), 2);
        assert_eq!(decoded.receipts.len(), 2);
    }

    // Property 7: pipeline ordering. publish precedes store, both precede retire.
    #[tokio::test]
    async fn pipeline_order_is_publish_then_store_then_retire() {
        let events = Arc::new(EventLog::new());
        let clock = Arc::new(ingestr_types::SystemClock);
        let coordinator = Arc::new(MemoryCoordinator::with_events(clock, events.clone()));
        let cache = Arc::new(MemoryBlockCache::with_events(events.clone()));
        let notifier = Arc::new(MemoryNotifier::with_events(events.clone()));
        let chain = Arc::new(MemoryChainClient::new());

        let tx_hash = B256::repeat_byte(0x03);
        chain.seed_block(
            7,
            FetchedBlock {
                header: json!({ "number": "0x7" }),
                hash: B256::repeat_byte(0x07),
                transactions: vec![json!({ "hash": format!("{tx_hash}") })],
            },
        );
        chain.seed_receipt(tx_hash, json!({ "status": "0x1" }));

        coordinator.claim_next_block(7, 10, 7).await.unwrap();
        run_block_task(7, coordinator.clone(), cache, notifier, chain).await;

        assert_eq!(events.events(), vec!["publish:7".to_string(), "store:7".to_string(), "retire:7".to_string()]);
    }

    #[tokio::test]
    async fn engine_claims_and_retires_a_cache_hit_end_to_end() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let cache = Arc::new(MemoryBlockCache::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let chain = Arc::new(MemoryChainClient::new());

        cache.seed(100, b"bytes-for-100".to_vec());

        let (tx, rx) = tokio::sync::watch::channel(Some(100u64));
        drop(tx);
        let tip = ingestr_chain::TipHandle::from_receiver(rx);

        let params = EngineParams {
            max_concurrency: 2,
            min_confirmations: 0,
            working_block_start: 100,
            working_block_ttl_seconds: 300,
        };

        let engine = Engine::new(coordinator.clone(), cache, notifier.clone(), chain, tip, params);
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let handle = tokio::spawn(engine.run(shutdown_clone));

        // Give the claim loop a moment to claim, run the pipeline, and retire.
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.expect("engine task should not panic");

        assert_eq!(notifier.published(), vec![100]);
        assert_eq!(coordinator.last_finished(), Some(100));
    }
}
