use ingestr_chain::ChainError;
use ingestr_types::EncodingError;
use thiserror::Error;

/// Errors raised while assembling and encoding a block on the cache-miss path.
/// Every variant here is handled identically by the per-block task: logged,
/// and the task aborts without retiring, relying on lease expiry for retry.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
