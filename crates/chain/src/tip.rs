use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use ingestr_types::BlockNumber;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{client::HeadSubscriber, error::ChainError};

/// How long to wait before attempting to resubscribe after the new-heads
/// stream drops.
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(2);

/// Read-only handle to the process-local tip height. Cheap to clone; every
/// clone observes the same underlying value.
#[derive(Clone)]
pub struct TipHandle {
    rx: watch::Receiver<Option<BlockNumber>>,
}

impl TipHandle {
    /// Builds a handle directly from a watch receiver, bypassing
    /// [`TipTracker::new`]. Useful for driving the Ingest Engine against a
    /// fixed or scripted tip in tests.
    pub fn from_receiver(rx: watch::Receiver<Option<BlockNumber>>) -> Self {
        Self { rx }
    }

    /// The most recently observed height, or `None` if no header has arrived
    /// yet.
    pub fn latest(&self) -> Option<BlockNumber> {
        *self.rx.borrow()
    }

    /// Suspends until a height has been observed at least once, returning it
    /// immediately if one already has been.
    pub async fn wait_until_set(&mut self) -> BlockNumber {
        loop {
            if let Some(height) = *self.rx.borrow_and_update() {
                return height;
            }
            if self.rx.changed().await.is_err() {
                // The tracker is gone; there is nothing left to wait for, but the
                // engine's own shutdown handling is expected to have torn the
                // process down by the time this could happen in practice.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Suspends until the tip changes from whatever it currently is.
    pub async fn changed(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// Subscribes once to the chain's new-heads stream at startup (fatal if that
/// fails) and thereafter overwrites a single process-local height for every
/// header that arrives. Holds no history; the Ingest Engine only ever reads
/// the latest value via a [`TipHandle`].
pub struct TipTracker {
    subscriber: Arc<dyn HeadSubscriber>,
    tx: watch::Sender<Option<BlockNumber>>,
}

impl TipTracker {
    /// Builds a tracker and its paired handle. The handle can be cloned freely
    /// and handed to the Ingest Engine before the tracker is ever connected.
    pub fn new(subscriber: Arc<dyn HeadSubscriber>) -> (Self, TipHandle) {
        let (tx, rx) = watch::channel(None);
        (Self { subscriber, tx }, TipHandle { rx })
    }

    /// Opens the initial new-heads subscription. This failure is fatal:
    /// callers should propagate it out of process bootstrap and exit rather
    /// than retrying, since nothing downstream can make progress without a
    /// tip. Once this succeeds, [`Self::run`] never fails — it resubscribes
    /// on its own for every subsequent drop.
    pub async fn connect(self) -> Result<ConnectedTipTracker, ChainError> {
        let stream = self.subscriber.subscribe_new_heads().await?;
        info!(target: "ingestr::chain", "subscribed to new heads");
        Ok(ConnectedTipTracker { subscriber: self.subscriber, tx: self.tx, stream })
    }
}

/// A [`TipTracker`] whose initial subscription has already succeeded.
pub struct ConnectedTipTracker {
    subscriber: Arc<dyn HeadSubscriber>,
    tx: watch::Sender<Option<BlockNumber>>,
    stream: crate::client::HeadStream,
}

impl ConnectedTipTracker {
    /// Runs forever, resubscribing with a short backoff whenever the stream
    /// ends or errors, until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self { subscriber, tx, mut stream } = self;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(target: "ingestr::chain", "tip tracker shutting down");
                    return;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(height)) => {
                            let _ = tx.send(Some(height));
                        }
                        Some(Err(err)) => {
                            warn!(target: "ingestr::chain", error = %err, "new-heads stream reported an error, resubscribing");
                            match resubscribe(subscriber.as_ref(), &shutdown).await {
                                Some(new_stream) => stream = new_stream,
                                None => return,
                            }
                        }
                        None => {
                            warn!(target: "ingestr::chain", "new-heads stream ended, resubscribing");
                            match resubscribe(subscriber.as_ref(), &shutdown).await {
                                Some(new_stream) => stream = new_stream,
                                None => return,
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Retries `subscribe_new_heads` with a fixed backoff until it succeeds or
/// `shutdown` is cancelled (in which case `None` is returned).
async fn resubscribe(subscriber: &dyn HeadSubscriber, shutdown: &CancellationToken) -> Option<crate::client::HeadStream> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => {}
        }

        match subscriber.subscribe_new_heads().await {
            Ok(stream) => {
                info!(target: "ingestr::chain", "resubscribed to new heads");
                return Some(stream);
            }
            Err(err) => {
                error!(target: "ingestr::chain", error = %err, "resubscribe attempt failed, retrying");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSubscriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HeadSubscriber for StaticSubscriber {
        async fn subscribe_new_heads(&self) -> Result<crate::client::HeadStream, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(stream::iter([Ok(10u64), Ok(11), Ok(12)])))
        }
    }

    #[tokio::test]
    async fn tip_handle_observes_latest_height() {
        let subscriber = Arc::new(StaticSubscriber { calls: AtomicUsize::new(0) });
        let (tracker, mut handle) = TipTracker::new(subscriber);
        let shutdown = CancellationToken::new();

        assert_eq!(handle.latest(), None);

        let connected = tracker.connect().await.expect("initial subscribe should succeed");

        let shutdown_clone = shutdown.clone();
        let join = tokio::spawn(async move { connected.run(shutdown_clone).await });

        let height = handle.wait_until_set().await;
        assert!(height >= 10);

        shutdown.cancel();
        let _ = join.await;
    }

    struct FailingSubscriber;

    #[async_trait]
    impl HeadSubscriber for FailingSubscriber {
        async fn subscribe_new_heads(&self) -> Result<crate::client::HeadStream, ChainError> {
            Err(ChainError::Subscribe("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn initial_subscribe_failure_is_returned_to_the_caller() {
        let (tracker, _handle) = TipTracker::new(Arc::new(FailingSubscriber));
        let err = tracker.connect().await.unwrap_err();
        assert!(matches!(err, ChainError::Subscribe(_)));
    }
}
