use serde::{Deserialize, Serialize};

use super::{AgentId, Filters, FrameworkId, OfferId, TaskId, TaskInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    Subscribe,
    Teardown,
    Accept,
    Decline,
    Revive,
    Kill,
    Acknowledge,
    Reconcile,
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webui_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub framework_info: FrameworkInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Launch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub task_infos: Vec<TaskInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<Launch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    pub offer_ids: Vec<OfferId>,
    pub operations: Vec<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decline {
    pub offer_ids: Vec<OfferId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kill {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledge {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileTask {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Reconcile {
    #[serde(default)]
    pub tasks: Vec<ReconcileTask>,
}

/// Outbound scheduler call.
///
/// `framework_id` is left empty by the constructors; the client stamps the
/// current subscription's id right before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
    #[serde(rename = "type")]
    pub kind: CallType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Subscribe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Accept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline: Option<Decline>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill: Option<Kill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<Acknowledge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<Reconcile>,
}

impl Call {
    fn bare(kind: CallType) -> Self {
        Self {
            framework_id: None,
            kind,
            subscribe: None,
            accept: None,
            decline: None,
            kill: None,
            acknowledge: None,
            reconcile: None,
        }
    }

    pub fn subscribe(framework_info: FrameworkInfo) -> Self {
        let framework_id = framework_info.id.clone();
        Self {
            framework_id,
            subscribe: Some(Subscribe { framework_info }),
            ..Self::bare(CallType::Subscribe)
        }
    }

    /// Accept one offer and launch `tasks` on it.
    pub fn launch(offer_id: OfferId, tasks: Vec<TaskInfo>, refuse_seconds: Option<f64>) -> Self {
        Self {
            accept: Some(Accept {
                offer_ids: vec![offer_id],
                operations: vec![Operation {
                    kind: OperationType::Launch,
                    launch: Some(Launch { task_infos: tasks }),
                }],
                filters: refuse_seconds.map(|s| Filters {
                    refuse_seconds: Some(s),
                }),
            }),
            ..Self::bare(CallType::Accept)
        }
    }

    pub fn decline(offer_ids: Vec<OfferId>, refuse_seconds: Option<f64>) -> Self {
        Self {
            decline: Some(Decline {
                offer_ids,
                filters: refuse_seconds.map(|s| Filters {
                    refuse_seconds: Some(s),
                }),
            }),
            ..Self::bare(CallType::Decline)
        }
    }

    pub fn kill(task_id: TaskId, agent_id: Option<AgentId>) -> Self {
        Self {
            kill: Some(Kill { task_id, agent_id }),
            ..Self::bare(CallType::Kill)
        }
    }

    pub fn acknowledge(agent_id: AgentId, task_id: TaskId, uuid: String) -> Self {
        Self {
            acknowledge: Some(Acknowledge {
                agent_id,
                task_id,
                uuid,
            }),
            ..Self::bare(CallType::Acknowledge)
        }
    }

    /// Empty task list asks for implicit reconciliation of every known task.
    pub fn reconcile(tasks: Vec<ReconcileTask>) -> Self {
        Self {
            reconcile: Some(Reconcile { tasks }),
            ..Self::bare(CallType::Reconcile)
        }
    }

    pub fn revive() -> Self {
        Self::bare(CallType::Revive)
    }

    pub fn suppress() -> Self {
        Self::bare(CallType::Suppress)
    }

    pub fn teardown() -> Self {
        Self::bare(CallType::Teardown)
    }
}
