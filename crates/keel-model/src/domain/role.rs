use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three task roles making up a managed cluster.
///
/// Declaration order is the startup order: a role may only be created once
/// the role it [depends on](Role::depends_on) is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Datastore,
    Server,
    Agent,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role: {0} (expected: datastore|server|agent)")]
pub struct RoleParseError(pub String);

impl Role {
    /// All roles in dependency order.
    pub const ALL: [Role; 3] = [Role::Datastore, Role::Server, Role::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Datastore => "datastore",
            Role::Server => "server",
            Role::Agent => "agent",
        }
    }

    /// The role that must be healthy before this one is created.
    pub fn depends_on(&self) -> Option<Role> {
        match self {
            Role::Datastore => None,
            Role::Server => Some(Role::Datastore),
            Role::Agent => Some(Role::Server),
        }
    }

    /// `<framework>:<role>`, the name every record of this role carries.
    pub fn qualified(&self, framework: &str) -> String {
        format!("{framework}:{}", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datastore" => Ok(Role::Datastore),
            "server" => Ok(Role::Server),
            "agent" => Ok(Role::Agent),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_chain_is_fixed() {
        assert_eq!(Role::Datastore.depends_on(), None);
        assert_eq!(Role::Server.depends_on(), Some(Role::Datastore));
        assert_eq!(Role::Agent.depends_on(), Some(Role::Server));
    }

    #[test]
    fn qualified_name() {
        assert_eq!(Role::Server.qualified("keel"), "keel:server");
    }

    #[test]
    fn parse_roles() {
        assert_eq!("Agent".parse::<Role>(), Ok(Role::Agent));
        assert!("worker".parse::<Role>().is_err());
    }
}
