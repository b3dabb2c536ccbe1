use std::sync::Arc;

use keel_model::{FrameworkState, PersistedSettings, Role, TaskId, TaskRecord, keys};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{instrument, warn};

use super::TaskStore;
use crate::error::StoreError;

/// Typed access to task records and the framework singletons.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn TaskStore>,
    framework: String,
}

impl Records {
    pub fn new(store: Arc<dyn TaskStore>, framework: impl Into<String>) -> Self {
        Self {
            store,
            framework: framework.into(),
        }
    }

    pub fn framework(&self) -> &str {
        &self.framework
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub async fn load(&self, role: Role, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.get_json(&keys::task_key(&self.framework, role, id)).await
    }

    /// Look a record up by id alone, trying every role.
    pub async fn find(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        for role in Role::ALL {
            if let Some(rec) = self.load(role, id).await? {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }

    #[instrument(level = "trace", skip_all, fields(id = %rec.id, state = rec.state.as_str()))]
    pub async fn save(&self, rec: &TaskRecord) -> Result<(), StoreError> {
        self.set_json(&rec.store_key(), rec).await
    }

    pub async fn remove(&self, role: Role, id: &TaskId) -> Result<bool, StoreError> {
        self.store
            .delete(&keys::task_key(&self.framework, role, id))
            .await
    }

    /// Records of `role`, oldest first. Undecodable entries are skipped.
    pub async fn list_role(&self, role: Role) -> Result<Vec<TaskRecord>, StoreError> {
        let cursor = self
            .store
            .scan(&keys::role_prefix(&self.framework, role))
            .await?;

        let mut out = Vec::new();
        for key in cursor {
            match self.get_json::<TaskRecord>(&key).await {
                Ok(Some(rec)) => out.push(rec),
                Ok(None) => {}
                Err(StoreError::Corrupt { key, reason }) => {
                    warn!(%key, %reason, "skipping undecodable task record");
                }
                Err(e) => return Err(e),
            }
        }
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(out)
    }

    /// Every record, grouped by role in dependency order.
    pub async fn list_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut out = Vec::new();
        for role in Role::ALL {
            out.extend(self.list_role(role).await?);
        }
        Ok(out)
    }

    pub async fn framework_state(&self) -> Result<FrameworkState, StoreError> {
        Ok(self
            .get_json(&keys::framework_key(&self.framework))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_framework_state(&self, state: &FrameworkState) -> Result<(), StoreError> {
        self.set_json(&keys::framework_key(&self.framework), state)
            .await
    }

    pub async fn settings(&self) -> Result<PersistedSettings, StoreError> {
        Ok(self
            .get_json(&keys::config_key(&self.framework))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &PersistedSettings) -> Result<(), StoreError> {
        self.set_json(&keys::config_key(&self.framework), settings)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(key, raw).await
    }
}

#[cfg(test)]
mod tests {
    use keel_model::{
        ContainerSpec, Discovery, PortMapping, Resources, TaskEnv, TaskState, Workload,
    };

    use super::*;
    use crate::state::MemoryStore;

    fn record(id: &str, created_at: u64) -> TaskRecord {
        TaskRecord {
            id: TaskId::from(id),
            name: "keel:agent".into(),
            framework: "keel".into(),
            workload: Workload::Agent,
            resources: Resources {
                cpus: 1.0,
                mem: 512.0,
                disk: 100.0,
            },
            limits: None,
            container: ContainerSpec {
                image: "rancher/k3s".into(),
                ports: vec![PortMapping::any(80, "http")],
                env: TaskEnv::new().with("TZ", "UTC").with("K3S_TOKEN", "s3cret"),
                ..Default::default()
            },
            discovery: Discovery::default(),
            labels: vec![],
            instances: 1,
            state: TaskState::Unset,
            agent_id: None,
            agent_hostname: None,
            address: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn records() -> (MemoryStore, Records) {
        let store = MemoryStore::new();
        let records = Records::new(Arc::new(store.clone()), "keel");
        (store, records)
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let (_, records) = records();
        let rec = record("a", 10);
        records.save(&rec).await.unwrap();

        let loaded = records.load(Role::Agent, &rec.id).await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(loaded.container.env.get("K3S_TOKEN"), Some("s3cret"));
        assert!(records.load(Role::Server, &rec.id).await.unwrap().is_none());
        assert_eq!(records.find(&rec.id).await.unwrap().unwrap().id, rec.id);
    }

    #[tokio::test]
    async fn list_role_is_oldest_first_and_skips_garbage() {
        let (store, records) = records();
        records.save(&record("late", 30)).await.unwrap();
        records.save(&record("early", 10)).await.unwrap();
        store.set("keel:agent:broken", "{".into()).await.unwrap();

        let ids: Vec<_> = records
            .list_role(Role::Agent)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[tokio::test]
    async fn singletons_default_when_missing() {
        let (_, records) = records();
        assert_eq!(records.framework_state().await.unwrap(), FrameworkState::default());

        let state = FrameworkState {
            framework_id: Some("fw-1".into()),
            mesos_cni: None,
        };
        records.save_framework_state(&state).await.unwrap();
        assert_eq!(records.framework_state().await.unwrap(), state);
        assert!(records.list_all().await.unwrap().is_empty());
    }
}
