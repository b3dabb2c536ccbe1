#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use keel_core::{
    Config, ConfigHandle, HealthProbe, KeyCursor, MemoryStore, NodeInfo, NodeView, Runtime,
    StoreError, TaskStore,
};
use keel_mesos::proto::{
    Call, CallType, ContainerStatus, FrameworkInfo, Id, IpAddress, NetworkInfo, Offer, Range,
    Resource, SchedulerEvent, TaskStatus,
};
use keel_mesos::{EventStream, MesosError, SchedulerClient};
use keel_model::{Role, TaskRecord, TaskState};

/// Scheduler client that remembers every call.
#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    pub fail_launch: AtomicBool,
}

impl RecordingClient {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<CallType> {
        self.calls().iter().map(|c| c.kind).collect()
    }

    pub fn count(&self, kind: CallType) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl SchedulerClient for RecordingClient {
    async fn subscribe(&self, _info: FrameworkInfo) -> Result<EventStream, MesosError> {
        Ok(stream::empty().boxed())
    }

    async fn call(&self, call: Call) -> Result<(), MesosError> {
        if call.kind == CallType::Accept && self.fail_launch.load(Ordering::SeqCst) {
            return Err(MesosError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

/// Health answers set by the test.
#[derive(Default)]
pub struct ScriptedProbe {
    pub datastore: AtomicBool,
    pub server: AtomicBool,
}

impl ScriptedProbe {
    pub fn set(&self, datastore: bool, server: bool) {
        self.datastore.store(datastore, Ordering::SeqCst);
        self.server.store(server, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn datastore(&self, running: &[TaskRecord]) -> bool {
        !running.is_empty() && self.datastore.load(Ordering::SeqCst)
    }

    async fn server(&self, _cfg: &Config) -> bool {
        self.server.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct ScriptedNodes {
    pub nodes: Mutex<Vec<NodeInfo>>,
    pub forgotten: Mutex<Vec<String>>,
}

#[async_trait]
impl NodeView for ScriptedNodes {
    async fn nodes(&self) -> Result<Vec<NodeInfo>, StoreError> {
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn forget(&self, name: &str) -> Result<(), StoreError> {
        self.nodes.lock().unwrap().retain(|n| n.name != name);
        self.forgotten.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Memory store whose reads and writes can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    writes_left: Mutex<Option<usize>>,
}

impl FlakyStore {
    /// Let `n` more writes through, then fail every write.
    pub fn fail_writes_after(&self, n: usize) {
        *self.writes_left.lock().unwrap() = Some(n);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected".into()));
        }
        if let Some(left) = self.writes_left.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(StoreError::Unavailable("injected".into()));
            }
            *left -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_write()?;
        self.inner.delete(key).await
    }

    async fn scan(&self, prefix: &str) -> Result<KeyCursor, StoreError> {
        self.check_read()?;
        self.inner.scan(prefix).await
    }
}

pub struct Harness {
    pub runtime: Runtime,
    pub client: Arc<RecordingClient>,
    pub probe: Arc<ScriptedProbe>,
    pub nodes: Arc<ScriptedNodes>,
    pub store: Arc<FlakyStore>,
}

impl Harness {
    pub fn new(datastores: u32, servers: u32, agents: u32) -> Self {
        let mut cfg = Config::default();
        cfg.datastore.instances = datastores;
        cfg.server.instances = servers;
        cfg.agent.instances = agents;
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: Config) -> Self {
        let client = Arc::new(RecordingClient::default());
        let probe = Arc::new(ScriptedProbe::default());
        let nodes = Arc::new(ScriptedNodes::default());
        let store = Arc::new(FlakyStore::default());

        let runtime = Runtime::new(
            ConfigHandle::new(cfg),
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&client) as Arc<dyn SchedulerClient>,
            Arc::clone(&probe) as Arc<dyn HealthProbe>,
            Arc::clone(&nodes) as Arc<dyn NodeView>,
        );
        Self {
            runtime,
            client,
            probe,
            nodes,
            store,
        }
    }

    pub async fn records(&self, role: Role) -> Vec<TaskRecord> {
        self.runtime.records().list_role(role).await.unwrap()
    }

    pub async fn all(&self) -> Vec<TaskRecord> {
        self.runtime.records().list_all().await.unwrap()
    }

    /// Launch `rec` through an offer and report it running.
    pub async fn run_task(&self, rec: &TaskRecord, agent: &str) {
        let offer = big_offer(&format!("offer-{}", rec.id), agent);
        self.runtime
            .engine()
            .handle_event(SchedulerEvent::Offers(vec![offer]))
            .await
            .unwrap();
        self.runtime
            .engine()
            .handle_event(SchedulerEvent::Update(status(rec.id.as_str(), agent, "TASK_RUNNING")))
            .await
            .unwrap();
        let now = self
            .runtime
            .records()
            .load(rec.role(), &rec.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(now.state, TaskState::Running);
    }
}

pub fn offer(id: &str, agent: &str, cpus: f64, mem: f64, disk: f64, ports: Vec<Range>) -> Offer {
    Offer {
        id: Id::new(id),
        framework_id: Id::new("fw-1"),
        agent_id: Id::new(agent),
        hostname: format!("{agent}.example"),
        resources: vec![
            Resource::scalar("cpus", cpus),
            Resource::scalar("mem", mem),
            Resource::scalar("disk", disk),
            Resource::ranges("ports", ports),
        ],
    }
}

/// Offer large enough for any default record.
pub fn big_offer(id: &str, agent: &str) -> Offer {
    offer(
        id,
        agent,
        16.0,
        65_536.0,
        1_000_000.0,
        vec![Range {
            begin: 31_000,
            end: 32_000,
        }],
    )
}

pub fn status(task: &str, agent: &str, state: &str) -> TaskStatus {
    TaskStatus {
        task_id: Id::new(task),
        state: state.into(),
        agent_id: Some(Id::new(agent)),
        uuid: Some(format!("uuid-{task}-{state}")),
        message: None,
        reason: None,
        source: None,
        container_status: Some(ContainerStatus {
            network_infos: vec![NetworkInfo {
                name: None,
                ip_addresses: vec![IpAddress {
                    ip_address: Some("10.0.0.7".into()),
                }],
            }],
        }),
    }
}
