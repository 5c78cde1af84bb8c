//! The Coordination Store Client: the distributed work-queue protocol that
//! lets a fleet of ingester processes claim, lease, and retire block numbers
//! without double-processing or starving any block.
//!
//! The protocol lives behind [`CoordinationBackend`] so the claim/retire
//! sequencing can be tested without a live Redis server; [`RedisCoordinator`]
//! is the production implementation.

mod backend;
mod error;
mod redis_backend;

pub use backend::CoordinationBackend;
pub use error::CoordinatorError;
pub use redis_backend::{CoordinatorKeys, RedisCoordinator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_conflict_message_names_the_cause() {
        let err = CoordinatorError::TxConflict;
        assert_eq!(err.to_string(), "transaction conflict: a watched key changed before commit");
    }

    #[test]
    fn coordinator_keys_clone_independently() {
        let keys = CoordinatorKeys {
            block_set: "ingestr:working_block_set".into(),
            time_set: "ingestr:working_time_set".into(),
            last_finished: "ingestr:last_finished_block".into(),
        };
        let cloned = keys.clone();
        assert_eq!(keys.block_set, cloned.block_set);
        assert_eq!(keys.time_set, cloned.time_set);
        assert_eq!(keys.last_finished, cloned.last_finished);
    }
}
