//! Desired-vs-actual comparison, once per tick.

use std::sync::Arc;

use keel_model::{FrameworkState, PersistedSettings, Role, TaskId, TaskRecord, TaskState};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::builder::{BuildContext, BuilderRouter, used_host_ports};
use crate::config::Config;
use crate::engine::LaunchEngine;
use crate::error::CoreError;
use crate::health::HealthProbe;
use crate::nodes::{NodeView, Readiness};
use crate::state::{Records, now_ms};

/// What one tick changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub created: Vec<TaskId>,
    pub killed: Vec<TaskId>,
    pub forgotten: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Health {
    datastore: bool,
    server: bool,
}

impl Health {
    fn of(&self, role: Role) -> bool {
        match role {
            Role::Datastore => self.datastore,
            Role::Server => self.server,
            Role::Agent => true,
        }
    }
}

pub struct Reconciler {
    records: Records,
    router: BuilderRouter,
    probe: Arc<dyn HealthProbe>,
    nodes: Arc<dyn NodeView>,
    engine: Arc<LaunchEngine>,
}

impl Reconciler {
    pub fn new(
        records: Records,
        router: BuilderRouter,
        probe: Arc<dyn HealthProbe>,
        nodes: Arc<dyn NodeView>,
        engine: Arc<LaunchEngine>,
    ) -> Self {
        Self {
            records,
            router,
            probe,
            nodes,
            engine,
        }
    }

    /// One tick against the snapshot `base`.
    ///
    /// Creates at most one record per role, in dependency order, and only
    /// when the role it depends on is healthy.
    #[instrument(level = "debug", skip_all)]
    pub async fn tick(&self, base: &Config) -> Result<TickReport, CoreError> {
        let mut settings = self.records.settings().await?;
        let framework = self.records.framework_state().await?;
        let cfg = base.with_settings(&settings);
        let all = self.records.list_all().await?;

        let health = self.probe_roles(&all, &cfg).await;
        debug!(datastore = health.datastore, server = health.server, "role health");

        let mut report = TickReport::default();
        let mut used = used_host_ports(&all);

        for role in Role::ALL {
            let active = all
                .iter()
                .filter(|r| r.role() == role && !r.is_terminal())
                .count();
            let desired = cfg.desired(role) as usize;
            if active >= desired {
                continue;
            }
            if let Some(dep) = role.depends_on().filter(|dep| !health.of(*dep)) {
                debug!(role = role.as_str(), depends_on = dep.as_str(), "waiting for dependency");
                continue;
            }

            let Some(rec) = self.create(role, &cfg, &framework, &used).await else {
                continue;
            };
            used.extend(used_host_ports([&rec]));
            info!(
                id = %rec.id,
                name = %rec.name,
                desired,
                active,
                "task record created"
            );

            if role == Role::Server && settings.server_url.is_none() {
                settings = PersistedSettings {
                    server_url: Some(cfg.server_url()),
                    server_port: Some(cfg.server.host_port),
                };
                if let Err(e) = self.records.save_settings(&settings).await {
                    warn!(error = %e, "could not persist computed server settings");
                }
            }
            report.created.push(rec.id);
        }

        self.node_pass(&all, &mut report).await;
        Ok(report)
    }

    async fn probe_roles(&self, all: &[TaskRecord], cfg: &Config) -> Health {
        let running = |role: Role| {
            all.iter()
                .filter(move |r| r.role() == role && r.state == TaskState::Running)
        };

        let datastores: Vec<TaskRecord> = running(Role::Datastore).cloned().collect();
        let datastore = self.probe.datastore(&datastores).await;
        // The API answering is not enough: a server record must be running.
        let server = running(Role::Server).next().is_some() && self.probe.server(cfg).await;

        Health { datastore, server }
    }

    async fn create(
        &self,
        role: Role,
        cfg: &Config,
        framework: &FrameworkState,
        used: &std::collections::BTreeSet<u32>,
    ) -> Option<TaskRecord> {
        let id = TaskId::new(Uuid::new_v4().to_string());
        let ctx = BuildContext {
            cfg,
            framework,
            used_ports: used,
            now: now_ms(),
        };

        let rec = match self.router.build(cfg.workload(role), &id, &ctx) {
            Ok(rec) => rec,
            Err(e) => {
                warn!(role = role.as_str(), error = %e, "task build failed, retrying next tick");
                return None;
            }
        };
        if let Err(e) = self.records.save(&rec).await {
            warn!(role = role.as_str(), error = %e, "could not persist new record, retrying next tick");
            return None;
        }
        Some(rec)
    }

    /// Drop node entries without a record and kill tasks whose node is not
    /// ready. Failures are logged; the next tick tries again.
    async fn node_pass(&self, all: &[TaskRecord], report: &mut TickReport) {
        let nodes = match self.nodes.nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "could not list nodes");
                return;
            }
        };

        for node in nodes {
            let Some(task_id) = &node.task_id else {
                continue;
            };
            match all.iter().find(|r| &r.id == task_id) {
                None => match self.nodes.forget(&node.name).await {
                    Ok(()) => {
                        debug!(node = %node.name, "removed node without task record");
                        report.forgotten.push(node.name);
                    }
                    Err(e) => warn!(node = %node.name, error = %e, "could not remove stale node"),
                },
                Some(rec) if node.ready != Readiness::Ready && rec.state == TaskState::Running => {
                    match self.engine.kill(rec).await {
                        Ok(()) => report.killed.push(rec.id.clone()),
                        Err(e) => warn!(id = %rec.id, error = %e, "could not kill task of unready node"),
                    }
                }
                Some(_) => {}
            }
        }
    }
}
