use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{KeyCursor, TaskStore};
use crate::error::StoreError;

/// In-process store; contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        Ok(inner.remove(key).is_some())
    }

    async fn scan(&self, prefix: &str) -> Result<KeyCursor, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let keys = inner
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(KeyCursor::new(keys))
    }

    async fn count(&self, prefix: &str) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_value() {
        let store = MemoryStore::new();
        store.set("keel:agent:1", "{}".into()).await.unwrap();

        assert_eq!(store.get("keel:agent:1").await.unwrap().as_deref(), Some("{}"));
        assert!(store.get("keel:agent:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_only_matches_prefix() {
        let store = MemoryStore::new();
        for key in ["keel:agent:1", "keel:agent:2", "keel:agentx", "keel:server:1", "other:agent:1"] {
            store.set(key, String::new()).await.unwrap();
        }

        let keys: Vec<_> = store.scan("keel:agent:").await.unwrap().collect();
        assert_eq!(keys, ["keel:agent:1", "keel:agent:2"]);
        assert_eq!(store.count("keel:").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        store.set("k", "v".into()).await.unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }
}
