//! The chain RPC client and Tip Tracker.
//!
//! [`ChainClient`] is the one-shot side: fetch a block by number, fetch a
//! receipt by transaction hash. [`TipTracker`] is the long-running side: it
//! owns the node's new-heads subscription and exposes the latest observed
//! height through a [`TipHandle`] the Ingest Engine polls.

mod client;
mod error;
mod tip;

pub use client::{transaction_hash, AlloyChainClient, AlloyHeadSubscriber, ChainClient, FetchedBlock, HeadStream, HeadSubscriber};
pub use error::ChainError;
pub use tip::{ConnectedTipTracker, TipHandle, TipTracker};
