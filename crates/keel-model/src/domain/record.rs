use serde::{Deserialize, Serialize};

use crate::{
    AgentId, ContainerSpec, Discovery, EpochMs, KeyValue, Limits, Resources, Role, TaskId,
    TaskState, Workload, keys,
};

/// Persisted desired/actual state of one task instance.
///
/// A record is written once by the reconciler in state [`TaskState::Unset`]
/// and afterwards only changes its lifecycle fields (`state`, `agent_id`,
/// `agent_hostname`, `address`, resolved host ports). Resource requirements
/// of a launched record are never edited; reconfiguration produces a new
/// record with a new [`TaskId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    /// Role-qualified name, `<framework>:<role>`.
    pub name: String,
    /// Framework the record belongs to; first segment of its store key.
    pub framework: String,
    pub workload: Workload,
    pub resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    pub container: ContainerSpec,
    pub discovery: Discovery,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<KeyValue>,
    /// Desired instance count of the role when this record was built.
    pub instances: u32,
    #[serde(default)]
    pub state: TaskState,
    /// Manager agent the task was launched on; empty until launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Hostname of that agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_hostname: Option<String>,
    /// Container address confirmed by a running status update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: EpochMs,
    pub updated_at: EpochMs,
}

impl TaskRecord {
    #[inline]
    pub fn role(&self) -> Role {
        self.workload.role()
    }

    /// Key this record is stored under.
    pub fn store_key(&self) -> String {
        keys::task_key(&self.framework, self.role(), &self.id)
    }

    /// Host port of the first published port, once known.
    pub fn first_host_port(&self) -> Option<u32> {
        self.container
            .ports
            .first()
            .map(|p| p.host_port)
            .filter(|p| *p != 0)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
