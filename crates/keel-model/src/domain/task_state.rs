use serde::{Deserialize, Serialize};

/// Lifecycle state of a task record.
///
/// States are ordered: `Unset → New → Staging → Starting → Running →
/// terminal`. A record never moves backwards along this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    /// Desired, not yet surfaced to offer matching.
    #[default]
    Unset,
    /// Waiting for a matching resource offer.
    New,
    /// Launched, the manager is staging it.
    Staging,
    /// Launched, the executor is starting it.
    Starting,
    /// Confirmed running by a status update.
    Running,
    /// Exited gracefully.
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// Map a manager status (`TASK_*`) onto a lifecycle state.
    ///
    /// Returns `None` for transitional manager states that carry no
    /// lifecycle change for the record (`TASK_KILLING`).
    pub fn from_mesos(state: &str) -> Option<Self> {
        match state {
            "TASK_STAGING" => Some(TaskState::Staging),
            "TASK_STARTING" => Some(TaskState::Starting),
            "TASK_RUNNING" => Some(TaskState::Running),
            "TASK_FINISHED" => Some(TaskState::Finished),
            "TASK_FAILED" | "TASK_ERROR" => Some(TaskState::Failed),
            "TASK_KILLED" => Some(TaskState::Killed),
            "TASK_LOST" | "TASK_DROPPED" | "TASK_GONE" | "TASK_GONE_BY_OPERATOR"
            | "TASK_UNREACHABLE" | "TASK_UNKNOWN" => Some(TaskState::Lost),
            _ => None,
        }
    }

    /// Returns `true` once the task will not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }

    /// Returns `true` while the record waits for an offer (`Unset` or `New`).
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Unset | TaskState::New)
    }

    /// Returns `true` once the task was handed to the manager.
    pub fn is_launched(&self) -> bool {
        matches!(
            self,
            TaskState::Staging | TaskState::Starting | TaskState::Running
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskState::Unset => 0,
            TaskState::New => 1,
            TaskState::Staging => 2,
            TaskState::Starting => 3,
            TaskState::Running => 4,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost => 5,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    ///
    /// Terminal states accept nothing; every other state accepts itself or
    /// any later state.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Unset => "unset",
            TaskState::New => "new",
            TaskState::Staging => "staging",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        for s in [
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Killed,
            TaskState::Lost,
        ] {
            assert!(s.is_terminal(), "{s:?}");
        }
        for s in [
            TaskState::Unset,
            TaskState::New,
            TaskState::Staging,
            TaskState::Starting,
            TaskState::Running,
        ] {
            assert!(!s.is_terminal(), "{s:?}");
        }
    }

    #[test]
    fn transitions_only_move_forward() {
        assert!(TaskState::Unset.can_transition_to(TaskState::New));
        assert!(TaskState::Staging.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Killed));

        assert!(!TaskState::Running.can_transition_to(TaskState::Staging));
        assert!(!TaskState::Starting.can_transition_to(TaskState::New));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Running));
        assert!(!TaskState::Killed.can_transition_to(TaskState::Killed));
    }

    #[test]
    fn mesos_states_map() {
        assert_eq!(TaskState::from_mesos("TASK_RUNNING"), Some(TaskState::Running));
        assert_eq!(TaskState::from_mesos("TASK_ERROR"), Some(TaskState::Failed));
        assert_eq!(TaskState::from_mesos("TASK_UNREACHABLE"), Some(TaskState::Lost));
        assert_eq!(TaskState::from_mesos("TASK_KILLING"), None);
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&TaskState::Staging).unwrap();
        assert_eq!(json, r#""staging""#);
        let back: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskState::Staging);
    }
}
