//! Supervised execution of the scheduler.
//!
//! Three long-lived tasks run under taskvisor:
//! - `keel-reconcile`: the fixed-interval tick (reconcile, promote, suppress);
//! - `keel-subscribe`: reads the manager's event stream into a bounded queue,
//!   failing (and so being restarted with backoff) when the stream drops;
//! - `keel-events`: drains the queue strictly in order into the engine.

mod identity;
pub use identity::framework_info;

use std::fmt::Display;
use std::sync::Arc;

use futures_util::StreamExt;
use keel_mesos::SchedulerClient;
use keel_mesos::proto::SchedulerEvent;
use taskvisor::{
    BackoffPolicy, SupervisorConfig, RestartPolicy, Subscribe, Supervisor, TaskError,
    TaskFn, TaskRef, TaskSpec,
};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::BuilderRouter;
use crate::config::ConfigHandle;
use crate::control::Operator;
use crate::engine::LaunchEngine;
use crate::error::CoreError;
use crate::health::HealthProbe;
use crate::nodes::NodeView;
use crate::reconcile::{Reconciler, TickReport};
use crate::state::{RecordLocks, Records, TaskStore};
use crate::suppress::SuppressController;

const RECONCILE_SLOT: &str = "keel-reconcile";
const SUBSCRIBE_SLOT: &str = "keel-subscribe";
const EVENTS_SLOT: &str = "keel-events";

type EventQueue = Arc<Mutex<mpsc::Receiver<SchedulerEvent>>>;

#[derive(Clone)]
pub struct Runtime {
    config: ConfigHandle,
    client: Arc<dyn SchedulerClient>,
    records: Records,
    engine: Arc<LaunchEngine>,
    reconciler: Arc<Reconciler>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Runtime {
    pub fn new(
        config: ConfigHandle,
        store: Arc<dyn TaskStore>,
        client: Arc<dyn SchedulerClient>,
        probe: Arc<dyn HealthProbe>,
        nodes: Arc<dyn NodeView>,
    ) -> Self {
        let records = Records::new(store, config.snapshot().framework.name.clone());
        let suppress = Arc::new(SuppressController::new(
            Arc::clone(&client),
            records.clone(),
        ));
        let engine = Arc::new(LaunchEngine::new(
            Arc::clone(&client),
            records.clone(),
            RecordLocks::new(),
            suppress,
            config.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            records.clone(),
            BuilderRouter::with_defaults(),
            probe,
            nodes,
            Arc::clone(&engine),
        ));

        Self {
            config,
            client,
            records,
            engine,
            reconciler,
            subscribers: Vec::new(),
        }
    }

    /// Supervisor event subscribers, e.g. the lifecycle journal.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn engine(&self) -> &Arc<LaunchEngine> {
        &self.engine
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn operator(&self) -> Operator {
        Operator::new(
            self.config.clone(),
            self.records.clone(),
            Arc::clone(&self.engine),
        )
    }

    /// Lay the persisted settings over the loaded configuration.
    pub async fn restore(&self) -> Result<(), CoreError> {
        let settings = self.records.settings().await?;
        let state = self.records.framework_state().await?;
        self.config.update(|cfg| *cfg = cfg.with_settings(&settings));
        info!(
            framework_id = state.framework_id.as_deref().unwrap_or("<new>"),
            server_url = settings.server_url.as_deref().unwrap_or("<unset>"),
            "persisted state restored"
        );
        Ok(())
    }

    /// One reconcile cycle: tick, promote, re-evaluate the offer signal.
    pub async fn cycle(&self) -> Result<TickReport, CoreError> {
        let cfg = self.config.snapshot();
        let report = self.reconciler.tick(&cfg).await?;
        self.engine.promote_unset().await?;
        self.engine
            .suppress()
            .evaluate(!report.created.is_empty())
            .await?;
        Ok(report)
    }

    /// Run until `token` is cancelled or the supervisor gives up.
    pub async fn run(&self, token: CancellationToken) -> Result<(), CoreError> {
        let cfg = self.config.snapshot();
        let (tx, rx) = mpsc::channel(cfg.scheduler.event_queue);

        let specs = vec![
            self.reconcile_task(token.clone()),
            self.subscribe_task(tx, token.clone()),
            self.events_task(Arc::new(Mutex::new(rx)), token.clone()),
        ];
        let sup = Supervisor::builder(SupervisorConfig::default())
            .with_subscribers(self.subscribers.clone())
            .build();

        info!(framework = %cfg.framework.name, master = %cfg.scheduler.master, "runtime starting");
        tokio::select! {
            res = sup.run(specs) => res.map_err(|e| CoreError::Supervisor(e.to_string())),
            _ = token.cancelled() => {
                info!("runtime stopped");
                Ok(())
            }
        }
    }

    fn reconcile_task(&self, token: CancellationToken) -> TaskSpec {
        let rt = self.clone();
        let task: TaskRef = TaskFn::arc(RECONCILE_SLOT, move |ctx: CancellationToken| {
            let rt = rt.clone();
            let token = token.clone();

            async move {
                let mut ticker = interval(rt.config.snapshot().tick());
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => return Err(TaskError::Canceled),
                        _ = token.cancelled() => return Ok(()),
                        _ = ticker.tick() => {}
                    }
                    match rt.cycle().await {
                        Ok(report) if report != TickReport::default() => {
                            debug!(?report, "reconcile cycle done");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "reconcile cycle failed, retrying next tick"),
                    }
                }
            }
        });
        supervised(task)
    }

    fn subscribe_task(&self, tx: mpsc::Sender<SchedulerEvent>, token: CancellationToken) -> TaskSpec {
        let rt = self.clone();
        let task: TaskRef = TaskFn::arc(SUBSCRIBE_SLOT, move |ctx: CancellationToken| {
            let rt = rt.clone();
            let tx = tx.clone();
            let token = token.clone();

            async move {
                let cfg = rt.config.snapshot();
                let state = rt.records.framework_state().await.map_err(fail)?;
                let mut events = rt
                    .client
                    .subscribe(framework_info(&cfg, &state))
                    .await
                    .map_err(fail)?;
                info!("event stream open");

                loop {
                    let item = tokio::select! {
                        _ = ctx.cancelled() => return Err(TaskError::Canceled),
                        _ = token.cancelled() => return Ok(()),
                        item = events.next() => item,
                    };
                    match item {
                        Some(Ok(event)) => match SchedulerEvent::try_from(event) {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    return Err(TaskError::Fatal {
                                        reason: "event queue closed".into(),
                                    });
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping malformed event"),
                        },
                        Some(Err(e)) => warn!(error = %e, "dropping undecodable event"),
                        None => {
                            return Err(TaskError::Fail {
                                reason: "event stream ended".into(),
                            });
                        }
                    }
                }
            }
        });
        supervised(task)
    }

    fn events_task(&self, queue: EventQueue, token: CancellationToken) -> TaskSpec {
        let rt = self.clone();
        let task: TaskRef = TaskFn::arc(EVENTS_SLOT, move |ctx: CancellationToken| {
            let rt = rt.clone();
            let queue = Arc::clone(&queue);
            let token = token.clone();

            async move {
                let mut rx = queue.lock().await;
                loop {
                    let event = tokio::select! {
                        _ = ctx.cancelled() => return Err(TaskError::Canceled),
                        _ = token.cancelled() => return Ok(()),
                        event = rx.recv() => event,
                    };
                    let Some(event) = event else {
                        return Ok(());
                    };
                    if let Err(e) = rt.engine.handle_event(event).await {
                        warn!(error = %e, "event processing failed");
                    }
                }
            }
        });
        supervised(task)
    }
}

fn supervised(task: TaskRef) -> TaskSpec {
    TaskSpec::new(task, RestartPolicy::OnFailure, BackoffPolicy::default(), None)
}

fn fail(e: impl Display) -> TaskError {
    TaskError::Fail {
        reason: e.to_string(),
    }
}
