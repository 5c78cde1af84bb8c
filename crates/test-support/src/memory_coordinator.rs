use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ingestr_coordinator::{CoordinationBackend, CoordinatorError};
use ingestr_types::{BlockNumber, Clock, SystemClock};

use crate::events::EventLog;

#[derive(Default)]
struct State {
    block_set: Vec<BlockNumber>,
    time_set: Vec<(BlockNumber, i64)>,
    last_finished: Option<BlockNumber>,
}

/// Deterministic, single-process stand-in for [`ingestr_coordinator::RedisCoordinator`].
///
/// Implements the exact claim/retire algorithm from the protocol (fused
/// find-stale-and-renew, fused find-frontier-and-insert, monotone-maximum
/// retire) without a WATCH/MULTI/EXEC round trip, so the work-queue
/// invariants can be asserted directly against in-process state.
pub struct MemoryCoordinator {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventLog>>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()), clock: Arc::new(SystemClock), events: None }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { state: Mutex::new(State::default()), clock, events: None }
    }

    /// Records a `"retire:<n>"` event for every successful retirement, for
    /// tests asserting pipeline ordering across multiple fakes.
    pub fn with_events(clock: Arc<dyn Clock>, events: Arc<EventLog>) -> Self {
        Self { state: Mutex::new(State::default()), clock, events: Some(events) }
    }

    pub fn block_set_members(&self) -> Vec<BlockNumber> {
        let mut members = self.state.lock().expect("poisoned").block_set.clone();
        members.sort_unstable();
        members
    }

    pub fn time_set_members(&self) -> Vec<BlockNumber> {
        let mut members: Vec<BlockNumber> =
            self.state.lock().expect("poisoned").time_set.iter().map(|(n, _)| *n).collect();
        members.sort_unstable();
        members
    }

    pub fn time_set_score(&self, member: BlockNumber) -> Option<i64> {
        self.state.lock().expect("poisoned").time_set.iter().find(|(n, _)| *n == member).map(|(_, s)| *s)
    }

    pub fn last_finished(&self) -> Option<BlockNumber> {
        self.state.lock().expect("poisoned").last_finished
    }

    /// Seeds a member directly into both sets with an explicit lease score,
    /// bypassing the claim protocol. Used to set up stale-lease scenarios.
    pub fn seed_claim(&self, block_number: BlockNumber, lease_score: i64) {
        let mut state = self.state.lock().expect("poisoned");
        state.block_set.push(block_number);
        state.time_set.push((block_number, lease_score));
    }

    pub fn seed_last_finished(&self, value: BlockNumber) {
        self.state.lock().expect("poisoned").last_finished = Some(value);
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationBackend for MemoryCoordinator {
    async fn claim_stale_block(&self, ttl_seconds: i64) -> Result<Option<BlockNumber>, CoordinatorError> {
        let now = self.clock.now_unix();
        let cutoff = now - ttl_seconds;
        let mut state = self.state.lock().expect("poisoned");

        let stale = state
            .time_set
            .iter()
            .filter(|(_, score)| *score <= cutoff)
            .min_by_key(|(_, score)| *score)
            .map(|(member, _)| *member);

        let Some(member) = stale else {
            return Ok(None);
        };

        if let Some(entry) = state.time_set.iter_mut().find(|(n, _)| *n == member) {
            entry.1 = now;
        }

        Ok(Some(member))
    }

    async fn claim_next_block(
        &self,
        allowed: BlockNumber,
        max_concurrency: usize,
        working_block_start: BlockNumber,
    ) -> Result<Option<BlockNumber>, CoordinatorError> {
        let now = self.clock.now_unix();
        let mut state = self.state.lock().expect("poisoned");

        if state.block_set.len() >= max_concurrency {
            return Ok(None);
        }

        let candidate = match state.block_set.iter().max().copied() {
            Some(highest) => {
                let mut candidate = highest + 1;
                if let Some(last_finished) = state.last_finished {
                    if last_finished >= candidate {
                        candidate = last_finished + 1;
                    }
                }
                candidate
            }
            None => match state.last_finished {
                Some(last_finished) => last_finished + 1,
                None => working_block_start,
            },
        };

        if candidate > allowed {
            return Ok(None);
        }

        state.block_set.push(candidate);
        state.time_set.push((candidate, now));

        Ok(Some(candidate))
    }

    async fn retire_block(&self, block_number: BlockNumber) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().expect("poisoned");

        if state.last_finished.is_none_or(|last| block_number > last) {
            state.last_finished = Some(block_number);
        }
        state.block_set.retain(|member| *member != block_number);
        state.time_set.retain(|(member, _)| *member != block_number);
        drop(state);

        if let Some(events) = &self.events {
            events.record(format!("retire:{block_number}"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestr_types::FixedClock;

    fn coordinator(now: i64) -> (MemoryCoordinator, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now));
        (MemoryCoordinator::with_clock(clock.clone()), clock)
    }

    // S1 - cold start, one worker.
    #[tokio::test]
    async fn cold_start_claims_from_working_block_start_then_advances() {
        let (coordinator, _clock) = coordinator(1_000);

        let first = coordinator.claim_next_block(200, 10, 100).await.unwrap();
        assert_eq!(first, Some(100));

        coordinator.retire_block(100).await.unwrap();
        assert_eq!(coordinator.last_finished(), Some(100));
        assert!(coordinator.block_set_members().is_empty());
        assert!(coordinator.time_set_members().is_empty());

        let second = coordinator.claim_next_block(200, 10, 100).await.unwrap();
        assert_eq!(second, Some(101));
    }

    // S2 - confirmation gate.
    #[tokio::test]
    async fn candidate_past_allowed_horizon_yields_none() {
        let (coordinator, _clock) = coordinator(1_000);
        coordinator.seed_last_finished(99);

        let claimed = coordinator.claim_next_block(99, 10, 100).await.unwrap();
        assert_eq!(claimed, None);
    }

    // S3 - stale recovery.
    #[tokio::test]
    async fn stale_lease_is_reclaimed_and_rescored() {
        let ttl = 300;
        let now = 10_000;
        let (coordinator, _clock) = coordinator(now);
        coordinator.seed_claim(500, now - ttl - 10);

        let reclaimed = coordinator.claim_stale_block(ttl).await.unwrap();
        assert_eq!(reclaimed, Some(500));
        assert_eq!(coordinator.time_set_score(500), Some(now));
        assert_eq!(coordinator.block_set_members(), vec![500]);
    }

    // S4 - retire past a gap.
    #[tokio::test]
    async fn retire_advances_last_finished_across_a_gap() {
        let (coordinator, _clock) = coordinator(1_000);
        coordinator.seed_last_finished(50);
        coordinator.seed_claim(53, 1_000);

        coordinator.retire_block(53).await.unwrap();

        assert_eq!(coordinator.last_finished(), Some(53));
        assert!(coordinator.block_set_members().is_empty());
        assert!(coordinator.time_set_members().is_empty());
    }

    // Property 1: LAST_FINISHED monotonicity, including the rejected
    // `blockNumber < lastFinishedBlock` predicate from the buggy source revision.
    #[tokio::test]
    async fn last_finished_never_decreases() {
        let (coordinator, _clock) = coordinator(1_000);
        coordinator.seed_claim(10, 1_000);
        coordinator.seed_claim(5, 1_000);

        coordinator.retire_block(10).await.unwrap();
        assert_eq!(coordinator.last_finished(), Some(10));

        coordinator.retire_block(5).await.unwrap();
        assert_eq!(coordinator.last_finished(), Some(10), "retiring an older block must not roll LAST_FINISHED back");
    }

    // Property 2 & 3: set symmetry and retired-not-present.
    #[tokio::test]
    async fn sets_stay_symmetric_and_drop_retired_members() {
        let (coordinator, _clock) = coordinator(1_000);

        let claimed = coordinator.claim_next_block(1_000, 10, 1).await.unwrap().unwrap();
        assert_eq!(coordinator.block_set_members(), coordinator.time_set_members());

        coordinator.retire_block(claimed).await.unwrap();
        assert_eq!(coordinator.block_set_members(), coordinator.time_set_members());
        assert!(!coordinator.block_set_members().contains(&claimed));
        assert!(!coordinator.time_set_members().contains(&claimed));
    }

    // Property 4: no double allocation, single contender.
    #[tokio::test]
    async fn sequential_claims_walk_forward_one_at_a_time() {
        let (coordinator, _clock) = coordinator(1_000);

        for expected in 1..=5u64 {
            let claimed = coordinator.claim_next_block(u64::MAX, 10, 1).await.unwrap();
            assert_eq!(claimed, Some(expected));
            coordinator.retire_block(expected).await.unwrap();
        }
    }

    // Property 6: concurrency bound, single contender.
    #[tokio::test]
    async fn claim_next_block_respects_concurrency_bound() {
        let (coordinator, _clock) = coordinator(1_000);

        for expected in 1..=3u64 {
            let claimed = coordinator.claim_next_block(u64::MAX, 3, 1).await.unwrap();
            assert_eq!(claimed, Some(expected));
        }

        let claimed = coordinator.claim_next_block(u64::MAX, 3, 1).await.unwrap();
        assert_eq!(claimed, None, "cardinality already at max_concurrency");
    }

    #[tokio::test]
    async fn claim_stale_block_returns_none_when_nothing_is_stale() {
        let ttl = 300;
        let (coordinator, _clock) = coordinator(10_000);
        coordinator.seed_claim(42, 9_999);

        let claimed = coordinator.claim_stale_block(ttl).await.unwrap();
        assert_eq!(claimed, None);
    }
}
