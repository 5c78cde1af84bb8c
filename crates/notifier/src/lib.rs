//! The Notifier Client: a fire-and-forget publish of a block-available
//! message. Ordering is not guaranteed and delivery is at-most-once from the
//! caller's point of view; there is no retry layer here, by design — a failed
//! publish aborts the block's task and the claim is never retired, so the
//! block is retried wholesale on a later pass.

mod error;

use std::time::Duration;

use async_trait::async_trait;
use ingestr_types::BlockNumber;
use tracing::instrument;

pub use error::NotifierError;

/// Publishes a single message announcing that a block is available.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, block_number: BlockNumber) -> Result<(), NotifierError>;
}

/// SNS-backed implementation.
pub struct SnsNotifier {
    client: aws_sdk_sns::Client,
    topic_arn: String,
    timeout: Duration,
}

impl SnsNotifier {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: impl Into<String>, timeout: Duration) -> Self {
        Self { client, topic_arn: topic_arn.into(), timeout }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    #[instrument(skip(self), fields(topic = %self.topic_arn))]
    async fn publish(&self, block_number: BlockNumber) -> Result<(), NotifierError> {
        let message = block_number.to_string();

        tokio::time::timeout(
            self.timeout,
            self.client.publish().topic_arn(&self.topic_arn).message(&message).send(),
        )
        .await
        .map_err(|_| NotifierError::Timeout)?
        .map_err(|err| NotifierError::Publish(Box::new(err)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_has_no_source() {
        let err = NotifierError::Timeout;
        assert_eq!(err.to_string(), "publish timed out");
    }
}
