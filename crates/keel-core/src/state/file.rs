use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{KeyCursor, TaskStore};
use crate::error::StoreError;

/// Store persisted as one JSON object on disk.
///
/// Every write rewrites the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new contents. The map is held in
/// memory only to serve reads; the file is authoritative on open.
pub struct FileStore {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open `path`, creating an empty store if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let map = match tokio::fs::read_to_string(&path).await {
            Ok(data) if data.trim().is_empty() => BTreeMap::new(),
            Ok(data) => serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(unavailable(&path, e)),
        };
        debug!(path = %path.display(), entries = map.len(), "file store opened");

        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(&self.path, e))?;
        }
        let data = serde_json::to_vec_pretty(map).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| unavailable(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "failed to replace store file");
            unavailable(&self.path, e)
        })
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {e}", path.display()))
}

#[async_trait]
impl TaskStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.lock().await.get(key).cloned())
    }

    /// The in-memory map only changes once the file write succeeded.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut map = self.map.lock().await;
        let mut next = map.clone();
        next.insert(key.to_string(), value);
        self.flush(&next).await?;
        *map = next;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut map = self.map.lock().await;
        if !map.contains_key(key) {
            return Ok(false);
        }
        let mut next = map.clone();
        next.remove(key);
        self.flush(&next).await?;
        *map = next;
        Ok(true)
    }

    async fn scan(&self, prefix: &str) -> Result<KeyCursor, StoreError> {
        let map = self.map.lock().await;
        Ok(KeyCursor::new(
            map.keys().filter(|k| k.starts_with(prefix)).cloned().collect(),
        ))
    }
}
