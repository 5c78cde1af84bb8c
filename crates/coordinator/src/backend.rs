use async_trait::async_trait;
use ingestr_types::BlockNumber;

use crate::error::CoordinatorError;

/// The three transactional operations the Ingest Engine needs from the shared
/// coordination store.
///
/// This is a trait rather than a bare `RedisCoordinator` so the claim/retire
/// protocol can be exercised against a deterministic in-memory backend in
/// tests, independent of a live Redis server.
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Reclaim the oldest lease whose age exceeds `ttl_seconds`, or `None` if
    /// none is stale.
    async fn claim_stale_block(
        &self,
        ttl_seconds: i64,
    ) -> Result<Option<BlockNumber>, CoordinatorError>;

    /// Claim the next never-started block number `<= allowed`, or `None` if the
    /// concurrency bound is reached or no such block exists yet.
    async fn claim_next_block(
        &self,
        allowed: BlockNumber,
        max_concurrency: usize,
        working_block_start: BlockNumber,
    ) -> Result<Option<BlockNumber>, CoordinatorError>;

    /// Retire a block: remove it from both work sets and advance
    /// `LAST_FINISHED` if it grew.
    async fn retire_block(&self, block_number: BlockNumber) -> Result<(), CoordinatorError>;
}
