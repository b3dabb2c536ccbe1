//! Store key layout.
//!
//! - `<framework>:<role>:<task id>` one task record
//! - `<framework>:framework` resumable framework identity
//! - `<framework>:framework_config` persisted computed settings
//! - `<framework>:kubernetes:<node>` node objects mirrored by the control plane

use crate::{Role, TaskId};

pub fn task_key(framework: &str, role: Role, id: &TaskId) -> String {
    format!("{framework}:{}:{id}", role.as_str())
}

/// Prefix shared by every record of `role`.
pub fn role_prefix(framework: &str, role: Role) -> String {
    format!("{framework}:{}:", role.as_str())
}

pub fn framework_key(framework: &str) -> String {
    format!("{framework}:framework")
}

pub fn config_key(framework: &str) -> String {
    format!("{framework}:framework_config")
}

pub fn node_prefix(framework: &str) -> String {
    format!("{framework}:kubernetes:")
}

pub fn node_key(framework: &str, node: &str) -> String {
    format!("{framework}:kubernetes:{node}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_key_is_role_qualified() {
        let id = TaskId::from("7f3c");
        assert_eq!(task_key("keel", Role::Agent, &id), "keel:agent:7f3c");
        assert!(task_key("keel", Role::Agent, &id).starts_with(&role_prefix("keel", Role::Agent)));
    }

    #[test]
    fn singleton_keys_do_not_collide_with_roles() {
        for role in Role::ALL {
            assert!(!framework_key("keel").starts_with(&role_prefix("keel", role)));
            assert!(!config_key("keel").starts_with(&role_prefix("keel", role)));
        }
    }
}
