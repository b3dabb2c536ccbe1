mod kv;
pub use kv::KeyValue;

mod task_env;
pub use task_env::TaskEnv;

mod task_id;
pub use task_id::TaskId;

mod role;
pub use role::{Role, RoleParseError};

mod workload;
pub use workload::{Backend, Workload};

mod task_state;
pub use task_state::TaskState;

mod resources;
pub use resources::{Limits, PortMapping, Resources};

mod container;
pub use container::{ContainerSpec, NetworkMode, Parameter, Uri, Volume, VolumeMode};

mod discovery;
pub use discovery::{Discovery, DiscoveryPort, Visibility};

mod record;
pub use record::TaskRecord;

mod framework;
pub use framework::{FrameworkState, PersistedSettings};

/// Identifier of a cluster-manager agent (the machine a task runs on).
pub type AgentId = String;

/// Milliseconds since the unix epoch.
pub type EpochMs = u64;
