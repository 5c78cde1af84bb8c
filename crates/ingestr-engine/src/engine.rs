use std::{sync::Arc, time::Duration};

use ingestr_cache::BlockCache;
use ingestr_chain::{ChainClient, TipHandle};
use ingestr_coordinator::CoordinationBackend;
use ingestr_notifier::Notifier;
use ingestr_types::BlockNumber;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::run_block_task;

/// How long the claim loop sleeps after both `claimStaleBlock` and
/// `claimNextBlock` return nothing to do, before trying again.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// How long `Engine::run` waits for in-flight per-block tasks to finish on
/// shutdown before aborting whatever remains.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The knobs the Ingest Engine's claim loop needs, independent of wiring.
/// Mirrors the relevant fields of `ingestr_config::Config`.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub max_concurrency: usize,
    pub min_confirmations: u64,
    pub working_block_start: BlockNumber,
    pub working_block_ttl_seconds: i64,
}

/// The main control loop: computes the allowed-work horizon, asks the
/// Coordination Store Client for a claim, runs the per-block pipeline, and
/// enforces the concurrency bound via a semaphore.
pub struct Engine {
    coordinator: Arc<dyn CoordinationBackend>,
    cache: Arc<dyn BlockCache>,
    notifier: Arc<dyn Notifier>,
    chain: Arc<dyn ChainClient>,
    tip: TipHandle,
    params: EngineParams,
}

impl Engine {
    pub fn new(
        coordinator: Arc<dyn CoordinationBackend>,
        cache: Arc<dyn BlockCache>,
        notifier: Arc<dyn Notifier>,
        chain: Arc<dyn ChainClient>,
        tip: TipHandle,
        params: EngineParams,
    ) -> Self {
        Self { coordinator, cache, notifier, chain, tip, params }
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight per-block
    /// tasks (up to a grace period) before returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.params.max_concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let latest = tokio::select! {
                _ = shutdown.cancelled() => break,
                height = self.tip.wait_until_set() => height,
            };

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.expect("semaphore is never explicitly closed")
                }
            };

            let allowed = latest.saturating_sub(self.params.min_confirmations);
            let claimed = self.try_claim(allowed).await;

            let Some(block_number) = claimed else {
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                }
                continue;
            };

            let coordinator = self.coordinator.clone();
            let cache = self.cache.clone();
            let notifier = self.notifier.clone();
            let chain = self.chain.clone();

            tasks.spawn(async move {
                let _permit = permit;
                run_block_task(block_number, coordinator, cache, notifier, chain).await;
            });

            reap_finished(&mut tasks);
        }

        info!(target: "ingestr::engine", in_flight = tasks.len(), "shutting down, draining in-flight tasks");
        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(err) = result {
                    warn!(target: "ingestr::engine", error = %err, "per-block task panicked during shutdown drain");
                }
            }
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(target: "ingestr::engine", "shutdown grace period elapsed with tasks still in flight, aborting the rest");
            tasks.abort_all();
        }
    }

    /// First tries to reclaim a stale lease, then tries to claim a brand-new
    /// block at or below `allowed`. Both calls already retry internally on
    /// `TxConflict`; any error that survives that retry is logged here and
    /// treated the same as "nothing to claim this tick."
    async fn try_claim(&self, allowed: BlockNumber) -> Option<BlockNumber> {
        match self.coordinator.claim_stale_block(self.params.working_block_ttl_seconds).await {
            Ok(Some(block_number)) => return Some(block_number),
            Ok(None) => {}
            Err(err) => {
                warn!(target: "ingestr::engine", error = %err, "claim_stale_block failed");
            }
        }

        match self
            .coordinator
            .claim_next_block(allowed, self.params.max_concurrency, self.params.working_block_start)
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(target: "ingestr::engine", error = %err, "claim_next_block failed");
                None
            }
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(err) = result {
            warn!(target: "ingestr::engine", error = %err, "per-block task panicked");
        }
    }
}
