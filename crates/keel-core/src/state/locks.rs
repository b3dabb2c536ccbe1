use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use keel_model::TaskId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries kept before idle locks are pruned.
const PRUNE_AT: usize = 256;

/// Per-record mutual exclusion shared by the reconcile loop and the event
/// processor. Different records never contend.
#[derive(Clone, Default)]
pub struct RecordLocks {
    table: Arc<Mutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>>,
}

/// Held while a record is being read-modified-written.
#[must_use]
pub struct RecordGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &TaskId) -> RecordGuard {
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.len() >= PRUNE_AT {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            Arc::clone(table.entry(id.clone()).or_default())
        };
        RecordGuard {
            _guard: entry.lock_owned().await,
        }
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_record_is_exclusive() {
        let locks = RecordLocks::new();
        let id = TaskId::from("t-1");

        let guard = locks.lock(&id).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock(&id)).await;
        assert!(blocked.is_err());

        drop(guard);
        let _again = locks.lock(&id).await;
    }

    #[tokio::test]
    async fn different_records_do_not_contend() {
        let locks = RecordLocks::new();
        let _a = locks.lock(&TaskId::from("a")).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&TaskId::from("b"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
