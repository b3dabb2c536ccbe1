use serde::{Deserialize, Serialize};

/// The framework's own resumable identity, persisted under
/// [`framework_key`](crate::keys::framework_key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkState {
    /// Id assigned by the manager on the first subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
    /// CNI network configured on the manager side, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesos_cni: Option<String>,
}

/// Computed settings that must survive restarts, persisted under
/// [`config_key`](crate::keys::config_key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSettings {
    /// Externally reachable control-plane URL; computed on the first
    /// server build and reused by every later server and agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Host port the control-plane API is published on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u32>,
}
