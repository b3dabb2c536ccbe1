use keel_mesos::MesosError;
use thiserror::Error;

/// Failure of the persisted store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Read or write did not reach the store; the operation is treated as
    /// not done and retried later.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Failure of a task spec build.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No free host port; retried on the next tick.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("no builder registered for workload {0}")]
    NoBuilder(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("cluster manager: {0}")]
    Mesos(#[from] MesosError),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("supervisor: {0}")]
    Supervisor(String),
}
