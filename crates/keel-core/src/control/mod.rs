//! Operator actions: scale, shutdown, start and restart.
//!
//! They only publish new configuration snapshots and remove records; the
//! reconcile loop does the rest on its next tick.

use std::sync::Arc;

use keel_model::{Role, TaskRecord};
use tracing::{info, instrument};

use crate::config::ConfigHandle;
use crate::engine::LaunchEngine;
use crate::error::CoreError;
use crate::state::Records;

#[derive(Clone)]
pub struct Operator {
    config: ConfigHandle,
    records: Records,
    engine: Arc<LaunchEngine>,
}

impl Operator {
    pub fn new(config: ConfigHandle, records: Records, engine: Arc<LaunchEngine>) -> Self {
        Self {
            config,
            records,
            engine,
        }
    }

    /// Set the desired count of `role`; surplus records are removed newest
    /// first. Returns the number of removed records.
    #[instrument(level = "info", skip(self), fields(role = role.as_str()))]
    pub async fn scale(&self, role: Role, n: u32) -> Result<usize, CoreError> {
        self.config.scale(role, n);
        if self.config.is_shut_down() {
            return Ok(0);
        }

        let active: Vec<TaskRecord> = self
            .records
            .list_role(role)
            .await?
            .into_iter()
            .filter(|r| !r.is_terminal())
            .collect();
        let surplus = active.len().saturating_sub(n as usize);

        let mut removed = 0;
        for rec in active.iter().rev().take(surplus) {
            if self.retire(rec).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Zero every desired count, kill every launched task and remove every
    /// record. Returns the number of removed records.
    #[instrument(level = "info", skip(self))]
    pub async fn shutdown(&self) -> Result<usize, CoreError> {
        self.config.shutdown();

        let mut removed = 0;
        for rec in self.records.list_all().await? {
            if self.retire(&rec).await? {
                removed += 1;
            }
        }
        info!(removed, "cluster shut down");
        Ok(removed)
    }

    /// Restore the desired counts saved by [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        self.config.start();
    }

    pub async fn restart(&self) -> Result<usize, CoreError> {
        let removed = self.shutdown().await?;
        self.start();
        Ok(removed)
    }

    async fn retire(&self, rec: &TaskRecord) -> Result<bool, CoreError> {
        let _guard = self.engine.locks().lock(&rec.id).await;
        let Some(current) = self.records.load(rec.role(), &rec.id).await? else {
            return Ok(false);
        };
        if current.state.is_launched() {
            self.engine.kill(&current).await?;
        }
        Ok(self.records.remove(current.role(), &current.id).await?)
    }
}
