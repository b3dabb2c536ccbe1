//! Offer matching and launch.
//!
//! Record lifecycle: `unset -> new -> staging -> starting -> running ->
//! {finished, failed, killed, lost}`. Every mutation happens under the
//! record's lock and goes through the store; a launch is only sent after
//! the `staging` record was written.

mod matcher;
pub use matcher::{Mismatch, fit};

use std::sync::Arc;

use keel_mesos::proto::{
    Id, Offer, OfferId, ReconcileTask, SchedulerEvent, Subscribed, TaskStatus,
};
use keel_mesos::{SchedulerClient, convert};
use keel_model::{PortMapping, TaskId, TaskRecord, TaskState};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ConfigHandle;
use crate::error::CoreError;
use crate::state::{RecordLocks, Records, now_ms};
use crate::suppress::SuppressController;

pub struct LaunchEngine {
    client: Arc<dyn SchedulerClient>,
    records: Records,
    locks: RecordLocks,
    suppress: Arc<SuppressController>,
    config: ConfigHandle,
}

impl LaunchEngine {
    pub fn new(
        client: Arc<dyn SchedulerClient>,
        records: Records,
        locks: RecordLocks,
        suppress: Arc<SuppressController>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            client,
            records,
            locks,
            suppress,
            config,
        }
    }

    pub fn locks(&self) -> &RecordLocks {
        &self.locks
    }

    pub fn suppress(&self) -> &Arc<SuppressController> {
        &self.suppress
    }

    /// Move every `unset` record to `new` and ask the manager for offers.
    ///
    /// Returns the number of promoted records.
    #[instrument(level = "debug", skip(self))]
    pub async fn promote_unset(&self) -> Result<usize, CoreError> {
        let mut promoted = 0;
        for rec in self.records.list_all().await? {
            if rec.state != TaskState::Unset {
                continue;
            }
            let _guard = self.locks.lock(&rec.id).await;
            let Some(mut rec) = self.records.load(rec.role(), &rec.id).await? else {
                continue;
            };
            if rec.state != TaskState::Unset {
                continue;
            }
            rec.state = TaskState::New;
            rec.updated_at = now_ms();
            self.records.save(&rec).await?;
            debug!(id = %rec.id, name = %rec.name, "record promoted to new");
            promoted += 1;
        }

        if promoted > 0 {
            self.suppress.revive().await?;
        }
        Ok(promoted)
    }

    /// Apply one subscription event, in stream order.
    pub async fn handle_event(&self, event: SchedulerEvent) -> Result<(), CoreError> {
        match event {
            SchedulerEvent::Subscribed(sub) => self.handle_subscribed(sub).await,
            SchedulerEvent::Offers(offers) => self.handle_offers(offers).await,
            SchedulerEvent::Update(status) => {
                self.handle_update(status).await?;
                self.suppress.evaluate(false).await?;
                Ok(())
            }
            SchedulerEvent::Rescind(offer_id) => {
                debug!(offer = %offer_id.value, "offer rescinded");
                Ok(())
            }
            SchedulerEvent::Heartbeat => {
                trace!("heartbeat");
                Ok(())
            }
            SchedulerEvent::Error(message) => {
                error!(%message, "cluster manager reported an error");
                Ok(())
            }
            SchedulerEvent::Other(kind) => {
                debug!(?kind, "ignoring event");
                Ok(())
            }
        }
    }

    async fn handle_subscribed(&self, sub: Subscribed) -> Result<(), CoreError> {
        let mut state = self.records.framework_state().await?;
        if state.framework_id.as_deref() != Some(sub.framework_id.value.as_str()) {
            state.framework_id = Some(sub.framework_id.value.clone());
            self.records.save_framework_state(&state).await?;
        }
        info!(framework_id = %sub.framework_id.value, "subscribed");
        self.suppress.reset().await;

        let tasks: Vec<ReconcileTask> = self
            .records
            .list_all()
            .await?
            .into_iter()
            .filter(|r| !r.is_terminal())
            .filter_map(|r| {
                r.agent_id.map(|agent| ReconcileTask {
                    task_id: Id::new(r.id.as_str()),
                    agent_id: Some(Id::new(agent)),
                })
            })
            .collect();
        if !tasks.is_empty() {
            debug!(tasks = tasks.len(), "requesting explicit reconciliation");
            self.client.reconcile(tasks).await?;
        }
        Ok(())
    }

    /// Match pending records against `offers`, oldest record first, at most
    /// one record per offer.
    ///
    /// Every offer that launches nothing is declined, also when a store
    /// failure ends the pass early.
    #[instrument(level = "debug", skip_all, fields(offers = offers.len()))]
    pub async fn handle_offers(&self, offers: Vec<Offer>) -> Result<(), CoreError> {
        let cfg = self.config.snapshot();
        let mut declined = Vec::new();
        let matched = self.match_offers(offers, &mut declined).await;

        if !declined.is_empty() {
            debug!(count = declined.len(), "declining offers");
            let sent = self.client.decline(declined, cfg.refuse_seconds()).await;
            if let Err(e) = sent {
                if matched.is_err() {
                    warn!(error = %e, "decline failed");
                } else {
                    return Err(e.into());
                }
            }
        }

        if matched? > 0 {
            self.suppress.evaluate(false).await?;
        }
        Ok(())
    }

    /// Returns the number of launched records. Offers not launched are
    /// pushed to `declined`, including the unprocessed rest on error.
    async fn match_offers(
        &self,
        offers: Vec<Offer>,
        declined: &mut Vec<OfferId>,
    ) -> Result<usize, CoreError> {
        let mut pending: Vec<TaskRecord> = match self.records.list_all().await {
            Ok(all) => all.into_iter().filter(|r| r.state == TaskState::New).collect(),
            Err(e) => {
                declined.extend(offers.into_iter().map(|o| o.id));
                return Err(e.into());
            }
        };
        pending.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let mut launched = 0;
        let mut offers = offers.into_iter();
        while let Some(offer) = offers.next() {
            let candidate = pending
                .iter()
                .position(|rec| match fit(&offer, rec) {
                    Ok(_) => true,
                    Err(why) => {
                        trace!(offer = %offer.id.value, id = %rec.id, %why, "record does not fit");
                        false
                    }
                });

            let outcome = match candidate {
                Some(pos) => {
                    let rec = pending.remove(pos);
                    self.launch(&offer, rec).await
                }
                None => Ok(false),
            };
            match outcome {
                Ok(true) => launched += 1,
                Ok(false) => declined.push(offer.id),
                Err(e) => {
                    declined.push(offer.id);
                    declined.extend(offers.by_ref().map(|o| o.id));
                    return Err(e);
                }
            }
        }
        Ok(launched)
    }

    /// Persist `staging` and accept the offer. Returns `false` when nothing
    /// was launched and the offer should be declined.
    async fn launch(&self, offer: &Offer, candidate: TaskRecord) -> Result<bool, CoreError> {
        let _guard = self.locks.lock(&candidate.id).await;
        let Some(mut rec) = self.records.load(candidate.role(), &candidate.id).await? else {
            return Ok(false);
        };
        if rec.state != TaskState::New {
            return Ok(false);
        }
        let ports = match fit(offer, &rec) {
            Ok(ports) => ports,
            Err(why) => {
                debug!(id = %rec.id, %why, "record changed and no longer fits");
                return Ok(false);
            }
        };

        let declared: Vec<PortMapping> = std::mem::replace(&mut rec.container.ports, ports);
        rec.state = TaskState::Staging;
        rec.agent_id = Some(offer.agent_id.value.clone());
        rec.agent_hostname = Some(offer.hostname.clone());
        rec.updated_at = now_ms();

        if let Err(e) = self.records.save(&rec).await {
            warn!(id = %rec.id, error = %e, "could not persist staging record, not launching");
            return Ok(false);
        }

        let info = convert::task_info(&rec, &offer.agent_id);
        let Err(e) = self.client.launch(offer.id.clone(), vec![info], None).await else {
            info!(
                id = %rec.id,
                name = %rec.name,
                agent = %offer.hostname,
                "task launched"
            );
            return Ok(true);
        };

        warn!(id = %rec.id, error = %e, "accept failed, record back to new");
        rec.container.ports = declared;
        rec.state = TaskState::New;
        rec.agent_id = None;
        rec.agent_hostname = None;
        rec.updated_at = now_ms();
        if let Err(revert) = self.records.save(&rec).await {
            // The stored record still claims `staging`. Asking the manager
            // about the task gets it reported unknown, which removes it.
            error!(id = %rec.id, error = %revert, "could not revert record after failed accept");
            let task = ReconcileTask {
                task_id: Id::new(rec.id.as_str()),
                agent_id: Some(offer.agent_id.clone()),
            };
            if let Err(e) = self.client.reconcile(vec![task]).await {
                warn!(id = %rec.id, error = %e, "reconcile of unlaunched task failed");
            }
            return Err(revert.into());
        }
        Ok(false)
    }

    /// Apply a status update and acknowledge it.
    ///
    /// Unknown tasks are only acknowledged. Terminal states remove the
    /// record so the next tick replaces it. An update that would move a
    /// record backwards is acknowledged and dropped. Nothing is
    /// acknowledged unless the matching store write succeeded.
    #[instrument(level = "debug", skip_all, fields(id = %status.task_id.value, state = %status.state))]
    pub async fn handle_update(&self, status: TaskStatus) -> Result<(), CoreError> {
        let id = TaskId::from(status.task_id.value.as_str());
        let _guard = self.locks.lock(&id).await;

        match (self.records.find(&id).await?, TaskState::from_mesos(&status.state)) {
            (None, _) => debug!("update for untracked task"),
            (Some(_), None) => trace!("transitional state"),
            (Some(rec), Some(next)) if !rec.state.can_transition_to(next) => {
                debug!(current = rec.state.as_str(), next = next.as_str(), "stale update dropped");
            }
            (Some(rec), Some(next)) if next.is_terminal() => {
                self.records.remove(rec.role(), &rec.id).await?;
                info!(
                    name = %rec.name,
                    state = next.as_str(),
                    reason = status.reason.as_deref().unwrap_or_default(),
                    message = status.message.as_deref().unwrap_or_default(),
                    "task ended, record removed"
                );
            }
            (Some(mut rec), Some(next)) => {
                rec.state = next;
                // Reconciliation answers may carry no container status.
                if let Some(ip) = status.ip_address().filter(|_| next == TaskState::Running) {
                    rec.address = Some(ip.to_string());
                }
                if rec.agent_id.is_none() {
                    rec.agent_id = status.agent_id.as_ref().map(|a| a.value.clone());
                }
                rec.updated_at = now_ms();
                self.records.save(&rec).await?;
                debug!(name = %rec.name, state = next.as_str(), "task state updated");
            }
        }

        self.acknowledge(&status).await
    }

    async fn acknowledge(&self, status: &TaskStatus) -> Result<(), CoreError> {
        let (Some(agent), Some(uuid)) = (&status.agent_id, &status.uuid) else {
            return Ok(());
        };
        self.client
            .acknowledge(agent.clone(), status.task_id.clone(), uuid.clone())
            .await?;
        Ok(())
    }

    /// Ask the manager to kill `rec`. The record itself is left alone; the
    /// outcome arrives as a status update.
    pub async fn kill(&self, rec: &TaskRecord) -> Result<(), CoreError> {
        info!(id = %rec.id, name = %rec.name, "killing task");
        self.client
            .kill(Id::new(rec.id.as_str()), rec.agent_id.as_deref().map(Id::new))
            .await?;
        Ok(())
    }
}
