//! Persisted task state.
//!
//! The store is the only state shared between the reconcile loop and the
//! event processor. Nothing here caches records across calls.

mod store;
pub use store::{KeyCursor, TaskStore};

mod memory;
pub use memory::MemoryStore;

mod file;
pub use file::FileStore;

mod records;
pub use records::Records;

mod locks;
pub use locks::{RecordGuard, RecordLocks};

use std::time::{SystemTime, UNIX_EPOCH};

use keel_model::EpochMs;

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> EpochMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as EpochMs)
        .unwrap_or(0)
}
