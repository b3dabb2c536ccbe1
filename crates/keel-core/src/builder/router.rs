use std::sync::Arc;

use keel_model::{Backend, TaskId, TaskRecord, Workload};
use tracing::{instrument, trace};

use super::{AgentBuilder, BuildContext, DatastoreBuilder, ServerBuilder, TaskBuilder};
use crate::error::BuildError;

#[derive(Default, Clone)]
pub struct BuilderRouter {
    builders: Vec<Arc<dyn TaskBuilder>>,
}

impl BuilderRouter {
    #[inline]
    pub fn new() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// Router with a builder for every workload variant.
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        router.register(Arc::new(DatastoreBuilder::new(Backend::Embedded)));
        router.register(Arc::new(DatastoreBuilder::new(Backend::Relational)));
        router.register(Arc::new(ServerBuilder));
        router.register(Arc::new(AgentBuilder));
        router
    }

    #[inline]
    pub fn register(&mut self, builder: Arc<dyn TaskBuilder>) {
        self.builders.push(builder);
    }

    pub fn pick(&self, workload: &Workload) -> Option<&Arc<dyn TaskBuilder>> {
        self.builders.iter().find(|b| b.supports(workload))
    }

    #[instrument(level = "trace", skip(self, ctx), fields(kind = workload.kind(), id = %task_id))]
    pub fn build(
        &self,
        workload: Workload,
        task_id: &TaskId,
        ctx: &BuildContext<'_>,
    ) -> Result<TaskRecord, BuildError> {
        let b = self
            .pick(&workload)
            .ok_or_else(|| BuildError::NoBuilder(workload.kind().to_string()))?;

        let record = b.build(task_id, ctx)?;
        trace!(builder = b.name(), "task record built");
        Ok(record)
    }
}
