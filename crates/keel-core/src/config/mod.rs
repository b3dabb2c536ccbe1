//! Process configuration.
//!
//! Loaded once at startup from an optional TOML file overlaid with
//! `KEEL__SECTION__FIELD` environment variables, validated, then published
//! as immutable snapshots through [`ConfigHandle`].

mod handle;
pub use handle::ConfigHandle;

use std::path::Path;
use std::time::Duration;

use keel_model::{Backend, KeyValue, PersistedSettings, Role, Workload};
use keel_observe::LoggerConfig;
use serde::Deserialize;

use crate::error::{BuildError, CoreError};

/// Environment prefix; `KEEL__SCHEDULER__MASTER` sets `scheduler.master`.
pub const ENV_PREFIX: &str = "KEEL";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub framework: FrameworkSection,
    pub scheduler: SchedulerSection,
    pub datastore: DatastoreSection,
    pub server: ServerSection,
    pub agent: AgentSection,
    pub docker: DockerSection,
    pub bootstrap: BootstrapSection,
    pub store: StoreSection,
    pub logging: LoggerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkSection {
    /// Framework name; prefixes every store key and container hostname.
    pub name: String,
    pub user: String,
    pub role: String,
    pub principal: Option<String>,
    /// Defaults to the machine hostname.
    pub hostname: Option<String>,
    pub webui_url: Option<String>,
    pub failover_timeout_secs: f64,
    pub checkpoint: bool,
    /// Suffix appended to container hostnames, e.g. `.weave.local`.
    pub domain: String,
    pub kubernetes_version: String,
    pub token: String,
    pub timezone: String,
    /// Send CPU/memory limits with agent tasks.
    pub enforce_limits: bool,
}

impl Default for FrameworkSection {
    fn default() -> Self {
        Self {
            name: "keel".into(),
            user: "root".into(),
            role: "*".into(),
            principal: None,
            hostname: None,
            webui_url: None,
            failover_timeout_secs: 5000.0,
            checkpoint: true,
            domain: String::new(),
            kubernetes_version: "v1.30.4".into(),
            token: String::new(),
            timezone: "UTC".into(),
            enforce_limits: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Base URL of the cluster manager.
    pub master: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub accept_invalid_certs: bool,
    pub tick_ms: u64,
    pub call_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Sent with every decline so the manager holds back the same resources.
    pub refuse_seconds: f64,
    /// Inclusive host port range the datastore port is drawn from.
    pub port_range_start: u32,
    pub port_range_end: u32,
    pub event_queue: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            master: "http://127.0.0.1:5050".into(),
            username: None,
            password: None,
            accept_invalid_certs: false,
            tick_ms: 2_000,
            call_timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            refuse_seconds: 120.0,
            port_range_start: 31_000,
            port_range_end: 32_000,
            event_queue: 1_024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatastoreSection {
    pub backend: Backend,
    pub instances: u32,
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    /// Container port of the datastore; kept as text so a malformed value
    /// is reported by validation rather than by the loader.
    pub port: String,
    pub image_embedded: String,
    pub image_relational: String,
    pub username: String,
    pub password: String,
    pub tls: bool,
    pub volume: String,
    pub labels: Vec<KeyValue>,
}

impl Default for DatastoreSection {
    fn default() -> Self {
        Self {
            backend: Backend::Embedded,
            instances: 1,
            cpus: 0.5,
            mem: 1024.0,
            disk: 1000.0,
            port: "2379".into(),
            image_embedded: "bitnami/etcd:latest".into(),
            image_relational: "mariadb:latest".into(),
            username: "root".into(),
            password: String::new(),
            tls: false,
            volume: "keel-datastore".into(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub instances: u32,
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    /// Fixed host port of the control-plane API.
    pub host_port: u32,
    /// Control-plane command line handed to the bootstrap script.
    pub args: String,
    /// Hostname the health probe connects to; defaults to the container
    /// hostname of the server role.
    pub hostname: Option<String>,
    /// Externally reachable URL; computed on the first server build.
    pub url: Option<String>,
    pub kubeconfig: String,
    pub volume: String,
    pub labels: Vec<KeyValue>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            instances: 1,
            cpus: 2.0,
            mem: 2048.0,
            disk: 10_000.0,
            host_port: 31_862,
            args: "/usr/local/bin/k3s server --cluster-cidr=10.2.0.0/16 --service-cidr=10.3.0.0/16"
                .into(),
            hostname: None,
            url: None,
            kubeconfig: "/mnt/mesos/sandbox/kubeconfig.yaml".into(),
            volume: "keel-server".into(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub instances: u32,
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub cpu_limit: f64,
    pub mem_limit: f64,
    pub disk_limit: f64,
    /// Restrict the container root filesystem to `disk_limit` MB.
    pub restrict_disk: bool,
    /// Whitespace-separated agent command line.
    pub args: String,
    /// Extra TCP container port published on a dynamic host port.
    pub extra_tcp_port: Option<u32>,
    pub registry_mirror: bool,
    pub custom_runtime: Option<String>,
    /// Mark agent nodes unschedulable until an operator clears the taint.
    pub enable_taint: bool,
    /// Copied verbatim into every agent container environment. Kept as a
    /// list of `{ key, value }` tables: map keys lose their case on load.
    pub env: Vec<KeyValue>,
    pub labels: Vec<KeyValue>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            instances: 1,
            cpus: 1.0,
            mem: 2048.0,
            disk: 10_000.0,
            cpu_limit: 2.0,
            mem_limit: 4096.0,
            disk_limit: 10_000.0,
            restrict_disk: false,
            args: "/usr/local/bin/k3s agent".into(),
            extra_tcp_port: None,
            registry_mirror: false,
            custom_runtime: None,
            enable_taint: false,
            env: Vec::new(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerSection {
    /// Docker network used when the manager has no CNI configured.
    pub cni: String,
    pub image: String,
    /// Extra arguments appended to server and agent command lines.
    pub args: String,
    /// Swap in MB added on top of each container's memory.
    pub memory_swap: f64,
    pub ulimit: String,
    pub shm_size: String,
    pub cgroup_v2: bool,
    pub volume_driver: String,
    pub force_pull: bool,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            cni: "bridge".into(),
            image: "rancher/k3s:v1.30.4-k3s1".into(),
            args: String::new(),
            memory_swap: 1024.0,
            ulimit: "65535".into(),
            shm_size: "30gb".into(),
            cgroup_v2: false,
            volume_driver: "local".into(),
            force_pull: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapSection {
    /// Script fetched into every server and agent sandbox as `bootstrap`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Skip certificate verification when probing the control plane.
    pub skip_ssl: bool,
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            url: "https://raw.githubusercontent.com/keel-dev/keel/main/bootstrap/bootstrap.sh"
                .into(),
            username: String::new(),
            password: String::new(),
            skip_ssl: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: "keel-state.json".into(),
        }
    }
}

impl Config {
    /// Load from `path` (if given) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Config = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Startup checks; any failure here is fatal.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: String| Err(CoreError::InvalidConfig(msg));

        let name = self.framework.name.trim();
        if name.is_empty() {
            return invalid("framework.name must not be empty".into());
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return invalid(format!(
                "framework.name {name:?} may only contain ascii letters, digits and '-'"
            ));
        }

        let master = self.scheduler.master.trim();
        if !(master.starts_with("http://") || master.starts_with("https://")) {
            return invalid(format!("scheduler.master {master:?} is not an http(s) url"));
        }
        if self.scheduler.tick_ms == 0 {
            return invalid("scheduler.tick_ms must be positive".into());
        }
        if self.scheduler.event_queue == 0 {
            return invalid("scheduler.event_queue must be positive".into());
        }

        let (start, end) = (self.scheduler.port_range_start, self.scheduler.port_range_end);
        if start == 0 || start > end || end > u16::MAX as u32 {
            return invalid(format!("host port range {start}..={end} is empty or out of range"));
        }
        if self.server.host_port == 0 {
            return invalid("server.host_port must be set".into());
        }

        self.datastore_port()
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    pub fn desired(&self, role: Role) -> u32 {
        match role {
            Role::Datastore => self.datastore.instances,
            Role::Server => self.server.instances,
            Role::Agent => self.agent.instances,
        }
    }

    pub fn set_desired(&mut self, role: Role, n: u32) {
        match role {
            Role::Datastore => self.datastore.instances = n,
            Role::Server => self.server.instances = n,
            Role::Agent => self.agent.instances = n,
        }
    }

    /// Variant a new record of `role` is built as.
    pub fn workload(&self, role: Role) -> Workload {
        match role {
            Role::Datastore => Workload::Datastore(self.datastore.backend),
            Role::Server => Workload::Server,
            Role::Agent => Workload::Agent,
        }
    }

    pub fn datastore_port(&self) -> Result<u32, BuildError> {
        match self.datastore.port.trim().parse::<u16>() {
            Ok(p) if p > 0 => Ok(p as u32),
            _ => Err(BuildError::InvalidConfig(format!(
                "datastore.port {:?} is not a valid port",
                self.datastore.port
            ))),
        }
    }

    /// Stable container hostname of `role`, e.g. `keelserver.weave.local`.
    pub fn hostname_of(&self, role: Role) -> String {
        format!("{}{}{}", self.framework.name, role.as_str(), self.framework.domain)
    }

    pub fn server_hostname(&self) -> String {
        self.server
            .hostname
            .clone()
            .unwrap_or_else(|| self.hostname_of(Role::Server))
    }

    /// Configured or previously computed URL, else the default derived from
    /// the server hostname.
    pub fn server_url(&self) -> String {
        self.server
            .url
            .clone()
            .unwrap_or_else(|| format!("https://{}:6443", self.hostname_of(Role::Server)))
    }

    /// Copy with persisted settings laid over the loaded values.
    pub fn with_settings(&self, settings: &PersistedSettings) -> Config {
        let mut cfg = self.clone();
        if let Some(url) = &settings.server_url {
            cfg.server.url = Some(url.clone());
        }
        if let Some(port) = settings.server_port {
            cfg.server.host_port = port;
        }
        cfg
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_ms)
    }

    pub fn refuse_seconds(&self) -> Option<f64> {
        (self.scheduler.refuse_seconds > 0.0).then_some(self.scheduler.refuse_seconds)
    }
}
