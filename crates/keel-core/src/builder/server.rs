use keel_model::{
    Backend, DiscoveryPort, PortMapping, Resources, Role, TaskId, TaskRecord, Workload,
};

use super::common;
use super::{BuildContext, TaskBuilder};
use crate::error::BuildError;

const API_PORT: u32 = 6443;
const HTTP_PORT: u32 = 8080;
const DATA_DIR: &str = "/var/lib/rancher/k3s";

/// Builds a control-plane server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerBuilder;

impl ServerBuilder {
    /// Connection string the control plane uses to reach the datastore.
    ///
    /// Always derived from the datastore's role hostname, which survives
    /// datastore restarts, never from a live task address.
    fn datastore_endpoint(ctx: &BuildContext<'_>) -> Result<String, BuildError> {
        let cfg = ctx.cfg;
        let host = cfg.hostname_of(Role::Datastore);
        let port = cfg.datastore_port()?;

        Ok(match cfg.datastore.backend {
            Backend::Embedded => format!("http://{host}:{port}"),
            Backend::Relational => format!(
                "mysql://{}:{}@tcp({host}:{port})/k3s",
                cfg.datastore.username, cfg.datastore.password
            ),
        })
    }

    fn command(ctx: &BuildContext<'_>) -> String {
        let cfg = ctx.cfg;
        let mut line = cfg.server.args.trim().to_string();
        let docker = cfg.docker.args.trim();
        if !docker.is_empty() {
            line.push(' ');
            line.push_str(docker);
        }
        format!(
            "$MESOS_SANDBOX/bootstrap '{line} --tls-san={}{}'",
            cfg.framework.name,
            Role::Server.as_str()
        )
    }
}

impl TaskBuilder for ServerBuilder {
    fn name(&self) -> &'static str {
        "server"
    }

    fn supports(&self, workload: &Workload) -> bool {
        *workload == Workload::Server
    }

    fn build(&self, task_id: &TaskId, ctx: &BuildContext<'_>) -> Result<TaskRecord, BuildError> {
        let cfg = ctx.cfg;
        let endpoint = Self::datastore_endpoint(ctx)?;

        let resources = Resources {
            cpus: cfg.server.cpus,
            mem: cfg.server.mem,
            disk: cfg.server.disk,
        };
        let mut rec =
            common::base_record(task_id, Workload::Server, resources, &cfg.server.labels, ctx);

        let spec = &mut rec.container;
        spec.image = cfg.docker.image.clone();
        spec.shell = true;
        spec.privileged = true;
        spec.command = Some(Self::command(ctx));

        common::add_runtime_parameters(spec, cfg.server.mem, ctx);
        common::add_net_alias(spec, Role::Server, ctx);
        spec.uris.push(common::bootstrap_uri(ctx));
        spec.volumes
            .push(common::volume(DATA_DIR, &cfg.server.volume, ctx));
        common::add_cgroup(spec, ctx);

        spec.ports
            .push(PortMapping::fixed(cfg.server.host_port, API_PORT, "tcp"));
        spec.ports.push(PortMapping::any(HTTP_PORT, "tcp"));
        rec.discovery.ports = vec![
            DiscoveryPort {
                number: API_PORT,
                name: "kubernetes".into(),
                protocol: "tcp".into(),
            },
            DiscoveryPort {
                number: HTTP_PORT,
                name: "http".into(),
                protocol: "tcp".into(),
            },
        ];

        let mut env = common::base_env(Role::Server, ctx)
            .with("KUBERNETES_VERSION", cfg.framework.kubernetes_version.as_str())
            .with("K3SFRAMEWORK_TYPE", "server")
            .with("K3S_URL", cfg.server_url())
            .with("K3S_TOKEN", cfg.framework.token.as_str())
            .with("K3S_KUBECONFIG_MODE", "666")
            .with("KUBECONFIG", cfg.server.kubeconfig.as_str())
            .with("K3S_DATASTORE_ENDPOINT", endpoint);
        if cfg.datastore.backend == Backend::Relational && cfg.datastore.tls {
            env.push("K3S_DATASTORE_CAFILE", format!("{DATA_DIR}/ca.pem"));
            env.push("K3S_DATASTORE_CERTFILE", format!("{DATA_DIR}/client-cert.pem"));
            env.push("K3S_DATASTORE_KEYFILE", format!("{DATA_DIR}/client-key.pem"));
        }
        rec.container.env = env;

        Ok(rec)
    }
}
