use thiserror::Error;

/// Errors from the Notifier Client.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("publish timed out")]
    Timeout,

    #[error("publish failed: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}
