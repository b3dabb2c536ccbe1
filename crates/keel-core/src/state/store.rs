use async_trait::async_trait;

use crate::error::StoreError;

/// Keys returned by a prefix scan, in ascending order.
#[derive(Debug, Default)]
pub struct KeyCursor {
    keys: std::vec::IntoIter<String>,
}

impl KeyCursor {
    pub fn new(mut keys: Vec<String>) -> Self {
        keys.sort();
        Self {
            keys: keys.into_iter(),
        }
    }
}

impl Iterator for KeyCursor {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.keys.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

/// Key/value store contract. Values never expire.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn scan(&self, prefix: &str) -> Result<KeyCursor, StoreError>;

    async fn count(&self, prefix: &str) -> Result<usize, StoreError> {
        Ok(self.scan(prefix).await?.count())
    }
}
