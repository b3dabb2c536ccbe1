use async_trait::async_trait;
use taskvisor::{Event, Subscribe};

use crate::subscriber::view::log_event;

/// Events buffered per subscriber before taskvisor drops new ones.
///
/// The runtime supervises three tasks; a restart storm under backoff
/// produces a few events per attempt, far below this bound.
pub const JOURNAL_CAPACITY: usize = 1024;

/// Forwards lifecycle events of the runtime tasks to `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct Journal {
    capacity: usize,
}

impl Journal {
    pub fn new() -> Self {
        Self::with_capacity(JOURNAL_CAPACITY)
    }

    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &Event) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "keel-journal"
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}
