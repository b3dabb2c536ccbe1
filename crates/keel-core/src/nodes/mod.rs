//! Orchestrator node view.
//!
//! Nodes are mirrored into the store by the control-plane side under
//! `<framework>:kubernetes:<node>`. Each node carries the id of the task
//! that runs it in the [`TASK_ID_LABEL`] label.

use std::sync::Arc;

use async_trait::async_trait;
use keel_model::{TaskId, keys};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::builder::TASK_ID_LABEL;
use crate::error::StoreError;
use crate::state::TaskStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    /// Originating task, if the node carries the label.
    pub task_id: Option<TaskId>,
    pub ready: Readiness,
}

#[async_trait]
pub trait NodeView: Send + Sync {
    async fn nodes(&self) -> Result<Vec<NodeInfo>, StoreError>;

    /// Drop a stale node entry.
    async fn forget(&self, name: &str) -> Result<(), StoreError>;
}

/// Node objects read back from the persisted store.
pub struct StoredNodes {
    store: Arc<dyn TaskStore>,
    framework: String,
}

impl StoredNodes {
    pub fn new(store: Arc<dyn TaskStore>, framework: impl Into<String>) -> Self {
        Self {
            store,
            framework: framework.into(),
        }
    }
}

#[derive(Deserialize)]
struct NodeObject {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    status: Status,
}

#[derive(Deserialize, Default)]
struct Metadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: serde_json::Map<String, Value>,
}

#[derive(Deserialize, Default)]
struct Status {
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// Decode one mirrored node object.
pub fn parse_node(fallback_name: &str, raw: &str) -> Result<NodeInfo, serde_json::Error> {
    let node: NodeObject = serde_json::from_str(raw)?;

    let task_id = node
        .metadata
        .labels
        .get(TASK_ID_LABEL)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(TaskId::from);
    let ready = match node
        .status
        .conditions
        .iter()
        .find(|c| c.kind == "Ready")
        .map(|c| c.status.as_str())
    {
        Some("True") => Readiness::Ready,
        Some("False") => Readiness::NotReady,
        _ => Readiness::Unknown,
    };
    let name = if node.metadata.name.is_empty() {
        fallback_name.to_string()
    } else {
        node.metadata.name
    };

    Ok(NodeInfo {
        name,
        task_id,
        ready,
    })
}

#[async_trait]
impl NodeView for StoredNodes {
    async fn nodes(&self) -> Result<Vec<NodeInfo>, StoreError> {
        let prefix = keys::node_prefix(&self.framework);
        let mut out = Vec::new();

        for key in self.store.scan(&prefix).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let fallback = key.strip_prefix(&prefix).unwrap_or(&key);
            match parse_node(fallback, &raw) {
                Ok(node) => out.push(node),
                Err(e) => warn!(%key, error = %e, "skipping undecodable node object"),
            }
        }
        Ok(out)
    }

    async fn forget(&self, name: &str) -> Result<(), StoreError> {
        self.store
            .delete(&keys::node_key(&self.framework, name))
            .await?;
        Ok(())
    }
}
