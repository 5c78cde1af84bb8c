use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ingestr_notifier::{Notifier, NotifierError};
use ingestr_types::BlockNumber;

use crate::events::EventLog;

/// In-memory stand-in for [`ingestr_notifier::SnsNotifier`]. Records every
/// published block number in order, since the ordering guarantee that matters
/// is this client's call relative to the cache and coordinator, not anything
/// the broker itself does.
#[derive(Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<BlockNumber>>,
    events: Option<Arc<EventLog>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Arc<EventLog>) -> Self {
        Self { published: Mutex::new(Vec::new()), events: Some(events) }
    }

    pub fn published(&self) -> Vec<BlockNumber> {
        self.published.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, block_number: BlockNumber) -> Result<(), NotifierError> {
        self.published.lock().expect("poisoned").push(block_number);
        if let Some(events) = &self.events {
            events.record(format!("publish:{block_number}"));
        }
        Ok(())
    }
}
