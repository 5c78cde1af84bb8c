use std::sync::Arc;

use ingestr_cache::{BlockCache, CacheError};
use ingestr_chain::{transaction_hash, ChainClient};
use ingestr_coordinator::CoordinationBackend;
use ingestr_notifier::Notifier;
use ingestr_types::{BlockNumber, EnrichedBlock};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Fetches the block and every transaction's receipt from the RPC node,
/// serially and in transaction order. Different blocks still run
/// concurrently against each other up to the engine's concurrency bound;
/// only the receipt fetches within *this* block are sequential.
async fn fetch_and_enrich(
    block_number: BlockNumber,
    chain: &dyn ChainClient,
) -> Result<Vec<u8>, EngineError> {
    let fetched = chain.fetch_block(block_number).await?;

    let mut receipts = Vec::with_capacity(fetched.transactions.len());
    for tx in &fetched.transactions {
        let hash = transaction_hash(block_number, tx)?;
        let receipt = chain.fetch_receipt(hash).await?;
        receipts.push(receipt);
    }

    let block = EnrichedBlock::new(fetched.header, fetched.hash, fetched.transactions, receipts);
    Ok(block.encode()?)
}

/// Runs the per-block pipeline to completion: cache-lookup, fetch+enrich on a
/// miss, publish, cache-store (only on a miss), retire. Any failure at any
/// stage is logged and the task returns without retiring; the block's lease
/// will eventually go stale and some worker — possibly this one — will pick
/// it back up. This function never panics on collaborator errors; it owns
/// them itself rather than letting them propagate across the task boundary.
pub async fn run_block_task(
    block_number: BlockNumber,
    coordinator: Arc<dyn CoordinationBackend>,
    cache: Arc<dyn BlockCache>,
    notifier: Arc<dyn Notifier>,
    chain: Arc<dyn ChainClient>,
) {
    debug!(target: "ingestr::engine", block = block_number, state = "Fetching", "looking up block cache");

    let (bytes, cache_hit) = match cache.get_block(block_number).await {
        Ok(bytes) => (bytes, true),
        Err(CacheError::NotFound(_)) => match fetch_and_enrich(block_number, chain.as_ref()).await {
            Ok(bytes) => (bytes, false),
            Err(err) => {
                warn!(target: "ingestr::engine", block = block_number, error = %err, "failed to fetch and enrich block, abandoning claim");
                return;
            }
        },
        Err(err) => {
            warn!(target: "ingestr::engine", block = block_number, error = %err, "block cache lookup failed, abandoning claim");
            return;
        }
    };

    debug!(target: "ingestr::engine", block = block_number, state = "Publishing", cache_hit, "publishing block availability");
    if let Err(err) = notifier.publish(block_number).await {
        warn!(target: "ingestr::engine", block = block_number, error = %err, "publish failed, abandoning claim");
        return;
    }

    if !cache_hit {
        debug!(target: "ingestr::engine", block = block_number, state = "Storing", "writing block to cache");
        if let Err(err) = cache.store_block(block_number, &bytes).await {
            warn!(target: "ingestr::engine", block = block_number, error = %err, "cache store failed, abandoning claim");
            return;
        }
    }

    debug!(target: "ingestr::engine", block = block_number, state = "Retiring", "retiring claim");
    if let Err(err) = coordinator.retire_block(block_number).await {
        warn!(target: "ingestr::engine", block = block_number, error = %err, "retire failed, lease will expire and be reclaimed");
        return;
    }

    debug!(target: "ingestr::engine", block = block_number, cache_hit, "block retired");
}
