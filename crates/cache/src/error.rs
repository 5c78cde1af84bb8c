use thiserror::Error;

/// Errors from the Block Cache Client.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The object does not exist at the given key. The Ingest Engine treats
    /// only this variant as a cache miss; everything else is a hard failure.
    #[error("block {0} is not present in the cache")]
    NotFound(u64),

    #[error("cache operation timed out")]
    Timeout,

    #[error("failed to decompress cached block: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to compress block for caching: {0}")]
    Compress(#[source] std::io::Error),

    #[error("object store get failed: {0}")]
    Get(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("object store put failed: {0}")]
    Put(#[source] Box<dyn std::error::Error + Send + Sync>),
}
