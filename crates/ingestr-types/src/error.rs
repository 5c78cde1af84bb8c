use thiserror::Error;

/// Errors produced while encoding or decoding an [`crate::EnrichedBlock`].
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to serialize enriched block: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize enriched block: {0}")]
    Deserialize(#[source] serde_json::Error),
}
