//! Task spec builders.
//!
//! One [`TaskBuilder`] per [`Workload`] variant, dispatched by
//! [`BuilderRouter`]. Builders are pure: identical inputs give identical
//! records, and nothing is written anywhere.

mod router;
pub use router::BuilderRouter;

mod common;
mod ports;
pub use ports::{allocate_host_port, used_host_ports};

mod datastore;
pub use datastore::DatastoreBuilder;

mod server;
pub use server::ServerBuilder;

mod agent;
pub use agent::{AgentBuilder, TASK_ID_LABEL};

use std::collections::BTreeSet;

use keel_model::{EpochMs, FrameworkState, TaskId, TaskRecord, Workload};

use crate::config::Config;
use crate::error::BuildError;

/// Everything a build may read.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Snapshot for this tick, with persisted settings applied.
    pub cfg: &'a Config,
    pub framework: &'a FrameworkState,
    /// Host ports already claimed by stored records.
    pub used_ports: &'a BTreeSet<u32>,
    pub now: EpochMs,
}

pub trait TaskBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, workload: &Workload) -> bool;

    /// Produce a new record in state `unset`.
    fn build(&self, task_id: &TaskId, ctx: &BuildContext<'_>) -> Result<TaskRecord, BuildError>;
}
