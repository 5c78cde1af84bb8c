use thiserror::Error;

/// Errors from the Coordination Store Client.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A watched key changed between the transaction's read and its commit.
    /// Retried internally up to the configured limit; surfaced only once that
    /// limit is exhausted.
    #[error("transaction conflict: a watched key changed before commit")]
    TxConflict,

    /// The connection or command itself failed — not a conflict.
    #[error("coordination store error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Checking out a connection from the pool failed.
    #[error("failed to check out a redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}
