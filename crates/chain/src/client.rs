use std::{pin::Pin, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    primitives::B256,
    providers::{Provider, ProviderBuilder, WsConnect},
};
use async_trait::async_trait;
use futures::Stream;
use ingestr_types::BlockNumber;
use serde_json::Value;
use tracing::instrument;

use crate::error::ChainError;

/// A block fetched verbatim from the RPC node, before receipts have been attached.
#[derive(Debug, Clone)]
pub struct FetchedBlock {
    pub header: Value,
    pub hash: B256,
    pub transactions: Vec<Value>,
}

/// One-shot RPC primitives the Ingest Engine needs to enrich a block on a cache
/// miss: fetch the block body and fetch each transaction's receipt.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn fetch_block(&self, number: BlockNumber) -> Result<FetchedBlock, ChainError>;
    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Value, ChainError>;
}

/// A never-ending stream of new-heads notifications, each carrying only the
/// block number. Consumed exclusively by the Tip Tracker.
pub type HeadStream = Pin<Box<dyn Stream<Item = Result<BlockNumber, ChainError>> + Send>>;

/// Subscribes to the node's new-heads feed. Separate from [`ChainClient`]
/// because a subscription is a connection-scoped resource the Tip Tracker owns
/// and reconnects on its own schedule, while [`ChainClient`] calls are
/// independent, one-shot, and reused across many concurrent per-block tasks.
#[async_trait]
pub trait HeadSubscriber: Send + Sync {
    async fn subscribe_new_heads(&self) -> Result<HeadStream, ChainError>;
}

/// Reads the `hash` field off a verbatim transaction as returned by the node.
/// Transactions are opaque JSON to this crate (per the data model, they are
/// preserved exactly as reported), so the hash has to be pulled back out of the
/// document rather than carried alongside it.
pub fn transaction_hash(block: BlockNumber, tx: &Value) -> Result<B256, ChainError> {
    tx.get("hash")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<B256>().ok())
        .ok_or(ChainError::MissingTransactionHash { block })
}

/// Production [`ChainClient`] and [`HeadSubscriber`] backed by `alloy`.
///
/// One-shot calls (`fetch_block`, `fetch_receipt`) go over a plain HTTP
/// provider built once at construction; subscriptions are opened fresh over a
/// WebSocket connection every time [`Self::subscribe_new_heads`] is called, so
/// the Tip Tracker can reconnect after a dropped stream without reaching back
/// into this client.
pub struct AlloyChainClient<P> {
    http: P,
    ws_endpoint: String,
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl<P> AlloyChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(http: P, ws_endpoint: impl Into<String>, connect_timeout: Duration, call_timeout: Duration) -> Self {
        Self { http, ws_endpoint: ws_endpoint.into(), connect_timeout, call_timeout }
    }
}

#[async_trait]
impl<P> ChainClient for AlloyChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    #[instrument(skip(self), fields(block = number))]
    async fn fetch_block(&self, number: BlockNumber) -> Result<FetchedBlock, ChainError> {
        let block = tokio::time::timeout(
            self.call_timeout,
            self.http.get_block_by_number(BlockNumberOrTag::Number(number)).full(),
        )
        .await
        .map_err(|_| ChainError::Timeout)?
        .map_err(|err| ChainError::Rpc(Box::new(err)))?
        .ok_or(ChainError::BlockNotFound(number))?;

        let header = serde_json::to_value(&block.header)
            .map_err(|err| ChainError::Rpc(Box::new(err)))?;
        let actual = block.header.number;
        if actual != number {
            return Err(ChainError::InconsistentResponse { block: number, expected: number, actual });
        }

        let transactions = block
            .transactions
            .as_transactions()
            .ok_or(ChainError::BlockNotFound(number))?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ChainError::Rpc(Box::new(err)))?;

        Ok(FetchedBlock { header, hash: block.header.hash, transactions })
    }

    #[instrument(skip(self))]
    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Value, ChainError> {
        let receipt = tokio::time::timeout(self.call_timeout, self.http.get_transaction_receipt(tx_hash))
            .await
            .map_err(|_| ChainError::Timeout)?
            .map_err(|err| ChainError::Rpc(Box::new(err)))?
            .ok_or_else(|| ChainError::Rpc(format!("no receipt for transaction {tx_hash}").into()))?;

        serde_json::to_value(&receipt).map_err(|err| ChainError::Rpc(Box::new(err)))
    }
}

/// `alloy`-backed [`HeadSubscriber`]. Reconnects the WebSocket transport from
/// scratch on every call, which is what lets the Tip Tracker recover from a
/// dropped stream by simply calling this again.
pub struct AlloyHeadSubscriber {
    ws_endpoint: String,
    connect_timeout: Duration,
}

impl AlloyHeadSubscriber {
    pub fn new(ws_endpoint: impl Into<String>, connect_timeout: Duration) -> Self {
        Self { ws_endpoint: ws_endpoint.into(), connect_timeout }
    }
}

#[async_trait]
impl HeadSubscriber for AlloyHeadSubscriber {
    async fn subscribe_new_heads(&self) -> Result<HeadStream, ChainError> {
        let ws = WsConnect::new(&self.ws_endpoint);
        let provider = tokio::time::timeout(self.connect_timeout, ProviderBuilder::new().connect_ws(ws))
            .await
            .map_err(|_| ChainError::Timeout)?
            .map_err(|err| ChainError::Subscribe(Box::new(err)))?;

        let subscription = provider.subscribe_blocks().await.map_err(|err| ChainError::Subscribe(Box::new(err)))?;

        use futures_util::StreamExt;
        let stream = subscription.into_stream().map(|header| Ok(header.number));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_hash_reads_hash_field() {
        let hash = B256::repeat_byte(0x42);
        let tx = json!({ "hash": format!("{hash}"), "nonce": 1 });
        assert_eq!(transaction_hash(1, &tx).unwrap(), hash);
    }

    #[test]
    fn transaction_hash_rejects_malformed_hex() {
        let tx = json!({ "hash": "not-a-hash" });
        assert!(transaction_hash(1, &tx).is_err());
    }

    #[test]
    fn transaction_hash_missing_field_is_an_error() {
        let tx = json!({ "nonce": 1 });
        let err = transaction_hash(7, &tx).unwrap_err();
        assert!(matches!(err, ChainError::MissingTransactionHash { block: 7 }));
    }
}
