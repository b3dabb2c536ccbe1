use keel_model::{
    Backend, DiscoveryPort, PortMapping, Resources, Role, TaskEnv, TaskId, TaskRecord, Workload,
};

use super::common;
use super::{BuildContext, TaskBuilder, allocate_host_port};
use crate::error::BuildError;

const EMBEDDED_DATA_DIR: &str = "/default.etcd";
const RELATIONAL_DATA_DIR: &str = "/var/lib/mysql";

/// Builds the datastore the control plane keeps its state in.
#[derive(Debug, Clone, Copy)]
pub struct DatastoreBuilder {
    backend: Backend,
}

impl DatastoreBuilder {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    fn embedded(&self, rec: &mut TaskRecord, port: u32, ctx: &BuildContext<'_>) {
        let cfg = ctx.cfg;
        let spec = &mut rec.container;

        spec.image = cfg.datastore.image_embedded.clone();
        spec.shell = true;
        spec.command = Some(format!(
            "/usr/local/bin/etcd --listen-client-urls http://0.0.0.0:{port} \
             --election-timeout '50000' --heartbeat-interval '5000'"
        ));
        spec.env = common::base_env(Role::Datastore, ctx)
            .with("ALLOW_NONE_AUTHENTICATION", "yes")
            .with(
                "ETCD_ADVERTISE_CLIENT_URLS",
                format!("http://{}:{port}", spec.hostname),
            )
            .with("ETCD_DATA_DIR", EMBEDDED_DATA_DIR);
        spec.volumes
            .push(common::volume(EMBEDDED_DATA_DIR, &cfg.datastore.volume, ctx));
    }

    fn relational(&self, rec: &mut TaskRecord, ctx: &BuildContext<'_>) {
        let cfg = ctx.cfg;
        let spec = &mut rec.container;

        spec.image = cfg.datastore.image_relational.clone();
        spec.shell = false;
        spec.command = None;
        if cfg.datastore.tls {
            spec.arguments = vec![
                format!("--ssl-ca={RELATIONAL_DATA_DIR}/ca.pem"),
                format!("--ssl-cert={RELATIONAL_DATA_DIR}/server-cert.pem"),
                format!("--ssl-key={RELATIONAL_DATA_DIR}/server-key.pem"),
            ];
        }

        let mut env: TaskEnv = common::base_env(Role::Datastore, ctx);
        env.push("MYSQL_ROOT_PASSWORD", cfg.datastore.password.as_str());
        env.push("MYSQL_DATABASE", "k3s");
        env.push("TZ", cfg.framework.timezone.as_str());
        spec.env = env;
        spec.volumes
            .push(common::volume(RELATIONAL_DATA_DIR, &cfg.datastore.volume, ctx));
    }
}

impl TaskBuilder for DatastoreBuilder {
    fn name(&self) -> &'static str {
        match self.backend {
            Backend::Embedded => "datastore-embedded",
            Backend::Relational => "datastore-relational",
        }
    }

    fn supports(&self, workload: &Workload) -> bool {
        *workload == Workload::Datastore(self.backend)
    }

    fn build(&self, task_id: &TaskId, ctx: &BuildContext<'_>) -> Result<TaskRecord, BuildError> {
        let cfg = ctx.cfg;
        let port = cfg.datastore_port()?;

        let sched = &cfg.scheduler;
        let mut used = ctx.used_ports.clone();
        used.insert(cfg.server.host_port);
        let host_port = allocate_host_port(sched.port_range_start..=sched.port_range_end, &used)
            .ok_or_else(|| {
                BuildError::ResourceExhausted(format!(
                    "no free host port in {}..={}",
                    sched.port_range_start, sched.port_range_end
                ))
            })?;

        let resources = Resources {
            cpus: cfg.datastore.cpus,
            mem: cfg.datastore.mem,
            disk: cfg.datastore.disk,
        };
        let mut rec = common::base_record(
            task_id,
            Workload::Datastore(self.backend),
            resources,
            &cfg.datastore.labels,
            ctx,
        );

        rec.container.privileged = false;
        rec.container.add_parameter("cap-add", "NET_ADMIN");
        common::add_net_alias(&mut rec.container, Role::Datastore, ctx);
        rec.container
            .ports
            .push(PortMapping::fixed(host_port, port, "tcp"));
        rec.discovery.ports.push(DiscoveryPort {
            number: port,
            name: "datastore".into(),
            protocol: "tcp".into(),
        });

        match self.backend {
            Backend::Embedded => self.embedded(&mut rec, port, ctx),
            Backend::Relational => self.relational(&mut rec, ctx),
        }
        Ok(rec)
    }
}
