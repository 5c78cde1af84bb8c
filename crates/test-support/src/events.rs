use std::sync::Mutex;

/// Records the order in which fakes are called, so pipeline-ordering
/// properties (publish before store, both before retire) can be asserted
/// without a real broker or object store in the loop.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().expect("event log poisoned").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("event log poisoned").clone()
    }
}
