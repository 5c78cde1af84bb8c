//! In-memory fakes for every external collaborator the Ingest Engine talks
//! to: the coordination store, the block cache, the notifier, and the chain
//! client. Lets the claim/retire protocol and the per-block pipeline be
//! exercised deterministically in unit tests, without a live Redis, S3, SNS,
//! or Ethereum node.

mod events;
mod memory_cache;
mod memory_chain;
mod memory_coordinator;
mod memory_notifier;

pub use events::EventLog;
pub use memory_cache::MemoryBlockCache;
pub use memory_chain::MemoryChainClient;
pub use memory_coordinator::MemoryCoordinator;
pub use memory_notifier::MemoryNotifier;
