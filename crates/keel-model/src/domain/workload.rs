use serde::{Deserialize, Serialize};

use crate::Role;

/// Datastore backend the control plane keeps its state in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded key-value store (etcd).
    Embedded,
    /// Relational database (MySQL/MariaDB).
    Relational,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Embedded => "embedded",
            Backend::Relational => "relational",
        }
    }
}

/// What a task runs.
///
/// Every variant has exactly one builder; adding a role or a backend means
/// adding a variant here and a builder for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "role", content = "backend")]
pub enum Workload {
    Datastore(Backend),
    Server,
    Agent,
}

impl Workload {
    pub fn role(&self) -> Role {
        match self {
            Workload::Datastore(_) => Role::Datastore,
            Workload::Server => Role::Server,
            Workload::Agent => Role::Agent,
        }
    }

    /// Short symbolic identifier, for logging and routing.
    pub fn kind(&self) -> &'static str {
        match self {
            Workload::Datastore(Backend::Embedded) => "datastore-embedded",
            Workload::Datastore(Backend::Relational) => "datastore-relational",
            Workload::Server => "server",
            Workload::Agent => "agent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_maps_to_role() {
        assert_eq!(Workload::Datastore(Backend::Relational).role(), Role::Datastore);
        assert_eq!(Workload::Server.role(), Role::Server);
        assert_eq!(Workload::Agent.role(), Role::Agent);
    }

    #[test]
    fn serde_tagged_form() {
        let json = serde_json::to_string(&Workload::Datastore(Backend::Embedded)).unwrap();
        assert_eq!(json, r#"{"role":"datastore","backend":"embedded"}"#);

        let back: Workload = serde_json::from_str(r#"{"role":"agent"}"#).unwrap();
        assert_eq!(back, Workload::Agent);
    }
}
