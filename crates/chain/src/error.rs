use thiserror::Error;

/// Errors from the chain RPC client and the Tip Tracker's subscription to it.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC call timed out")]
    Timeout,

    #[error("RPC call failed: {0}")]
    Rpc(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("block {0} was not found by the node")]
    BlockNotFound(u64),

    #[error(
        "inconsistent RPC response for block {block}: requested block {expected} but the node \
         returned header number {actual}"
    )]
    InconsistentResponse { block: u64, expected: u64, actual: u64 },

    #[error("transaction in block {block} is missing its hash field")]
    MissingTransactionHash { block: u64 },

    #[error("failed to subscribe to new heads: {0}")]
    Subscribe(#[source] Box<dyn std::error::Error + Send + Sync>),
}
