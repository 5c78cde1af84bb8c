use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::Pool;
use ingestr_types::{BlockNumber, Clock, SystemClock};
use redis::{AsyncCommands, RedisError};
use tracing::{debug, warn};

use crate::{backend::CoordinationBackend, error::CoordinatorError};

/// How many times a claim/retire transaction retries after losing a WATCH race
/// before giving up.
const MAX_RETRIES: u32 = 10;

/// Key names the coordinator reads and writes. Defaults mirror [`ingestr_config::Config`]'s
/// `redis_working_block_set_key` / `redis_working_time_set_key` /
/// `redis_last_finished_block_key` fields; callers construct this from that config.
#[derive(Debug, Clone)]
pub struct CoordinatorKeys {
    pub block_set: String,
    pub time_set: String,
    pub last_finished: String,
}

/// Coordination store client backed by a pool of live Redis connections.
///
/// Every mutating operation is a WATCH/MULTI/EXEC transaction: the watched keys
/// are read outside the pipeline, the decision is made in Rust, and the
/// mutation is submitted as an atomic pipeline. Redis scopes a transaction's
/// watched keys and queued `MULTI` block to the physical connection that
/// issued them, so each call checks out its own connection from the pool
/// rather than sharing one multiplexed connection across concurrent callers —
/// otherwise one task's `WATCH`/`MULTI`/`EXEC` could interleave on the wire
/// with another's and corrupt both transactions' isolation. Redis aborts the
/// `EXEC` (surfaced here as `Ok(None)` on the pipeline's query) if any watched
/// key changed in between, and the caller retries from scratch on a fresh
/// connection.
pub struct RedisCoordinator {
    pool: Pool,
    keys: CoordinatorKeys,
    clock: Arc<dyn Clock>,
}

impl RedisCoordinator {
    pub fn new(pool: Pool, keys: CoordinatorKeys) -> Self {
        Self { pool, keys, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(pool: Pool, keys: CoordinatorKeys, clock: Arc<dyn Clock>) -> Self {
        Self { pool, keys, clock }
    }
}

#[async_trait]
impl CoordinationBackend for RedisCoordinator {
    async fn claim_stale_block(
        &self,
        ttl_seconds: i64,
    ) -> Result<Option<BlockNumber>, CoordinatorError> {
        let cutoff = self.clock.now_unix() - ttl_seconds;

        for attempt in 0..MAX_RETRIES {
            let mut conn = self.pool.get().await?;

            redis::cmd("WATCH").arg(&self.keys.time_set).query_async::<_, ()>(&mut conn).await?;

            let stale: Vec<(String, i64)> = conn
                .zrangebyscore_withscores(&self.keys.time_set, "-inf", cutoff)
                .await?;
            let Some((member, _score)) = stale.into_iter().next() else {
                redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
                return Ok(None);
            };

            let now = self.clock.now_unix();
            let result: Option<()> = redis::pipe()
                .atomic()
                .zadd(&self.keys.time_set, &member, now)
                .ignore()
                .query_async(&mut conn)
                .await?;

            if result.is_some() {
                let block_number: BlockNumber = member.parse().map_err(|_| {
                    CoordinatorError::Backend(RedisError::from((
                        redis::ErrorKind::TypeError,
                        "working time set member is not a block number",
                    )))
                })?;
                return Ok(Some(block_number));
            }

            debug!(target: "ingestr::coordinator", attempt, "claim_stale_block lost a WATCH race, retrying");
        }

        warn!(target: "ingestr::coordinator", "claim_stale_block exhausted retries, yielding this tick");
        Ok(None)
    }

    async fn claim_next_block(
        &self,
        allowed: BlockNumber,
        max_concurrency: usize,
        working_block_start: BlockNumber,
    ) -> Result<Option<BlockNumber>, CoordinatorError> {
        for attempt in 0..MAX_RETRIES {
            let mut conn = self.pool.get().await?;

            redis::cmd("WATCH")
                .arg(&self.keys.block_set)
                .arg(&self.keys.last_finished)
                .query_async::<_, ()>(&mut conn)
                .await?;

            let in_flight: usize = conn.zcard(&self.keys.block_set).await?;
            if in_flight >= max_concurrency {
                redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
                return Ok(None);
            }

            let last_finished: Option<BlockNumber> =
                conn.get(&self.keys.last_finished).await?;
            let highest_claimed: Vec<(String, f64)> =
                conn.zrevrange_withscores(&self.keys.block_set, 0, 0).await?;

            let candidate = match highest_claimed.into_iter().next() {
                Some((_, highest)) => {
                    let mut candidate = (highest as BlockNumber) + 1;
                    if let Some(last) = last_finished {
                        if last >= candidate {
                            candidate = last + 1;
                        }
                    }
                    candidate
                }
                None => match last_finished {
                    Some(last) => last + 1,
                    None => working_block_start,
                },
            };

            if candidate > allowed {
                redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
                return Ok(None);
            }

            let now = self.clock.now_unix();
            let key = candidate.to_string();
            let result: Option<()> = redis::pipe()
                .atomic()
                .zadd(&self.keys.time_set, &key, now)
                .ignore()
                .zadd(&self.keys.block_set, &key, candidate)
                .ignore()
                .query_async(&mut conn)
                .await?;

            if result.is_some() {
                return Ok(Some(candidate));
            }

            debug!(target: "ingestr::coordinator", attempt, "claim_next_block lost a WATCH race, retrying");
        }

        warn!(target: "ingestr::coordinator", "claim_next_block exhausted retries, yielding this tick");
        Ok(None)
    }

    async fn retire_block(&self, block_number: BlockNumber) -> Result<(), CoordinatorError> {
        for attempt in 0..MAX_RETRIES {
            let mut conn = self.pool.get().await?;

            redis::cmd("WATCH").arg(&self.keys.last_finished).query_async::<_, ()>(&mut conn).await?;

            let current: Option<BlockNumber> = conn.get(&self.keys.last_finished).await?;
            let should_advance = current.is_none_or(|last| block_number > last);

            let mut pipe = redis::pipe();
            pipe.atomic();
            if should_advance {
                pipe.set(&self.keys.last_finished, block_number).ignore();
            }
            pipe.zrem(&self.keys.block_set, block_number.to_string()).ignore();
            pipe.zrem(&self.keys.time_set, block_number.to_string()).ignore();

            let result: Option<()> = pipe.query_async(&mut conn).await?;
            if result.is_some() {
                return Ok(());
            }

            debug!(target: "ingestr::coordinator", attempt, block_number, "retire_block lost a WATCH race, retrying");
        }

        Err(CoordinatorError::TxConflict)
    }
}
