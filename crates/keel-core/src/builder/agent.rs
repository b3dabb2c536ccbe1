use keel_model::{
    DiscoveryPort, Limits, PortMapping, Resources, Role, TaskId, TaskRecord, Workload,
};

use super::common;
use super::{BuildContext, TaskBuilder};
use crate::error::BuildError;

/// Label the control plane puts on every node it registers for an agent.
pub const TASK_ID_LABEL: &str = "keel.dev/taskid";

const BOOTSTRAP: &str = "/mnt/mesos/sandbox/bootstrap";
const SNAPSHOTTERS: [&str; 2] = [
    "/var/lib/rancher/k3s/agent/containerd/io.containerd.snapshotter.v1.content",
    "/var/lib/rancher/k3s/agent/containerd/io.containerd.snapshotter.v1.native",
];

/// Builds a worker agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentBuilder;

impl AgentBuilder {
    fn arguments(task_id: &TaskId, ctx: &BuildContext<'_>) -> Vec<String> {
        let cfg = ctx.cfg;
        let mut args: Vec<String> = cfg.agent.args.split_whitespace().map(String::from).collect();

        let docker = cfg.docker.args.trim();
        if !docker.is_empty() {
            args.push(docker.to_string());
        }
        args.push(format!("--with-node-id {task_id}"));
        args.push(format!("--kubelet-arg node-labels {TASK_ID_LABEL}={task_id}"));
        if cfg.agent.enable_taint {
            args.push("--node-taint node.kubernetes.io/unschedulable=true:NoSchedule".into());
        }
        if cfg.agent.registry_mirror {
            args.push("--embedded-registry".into());
        }
        args
    }

    fn ports(ctx: &BuildContext<'_>) -> Vec<PortMapping> {
        let agent = &ctx.cfg.agent;
        let mut ports = vec![PortMapping::any(80, "http"), PortMapping::any(443, "https")];
        if let Some(port) = agent.extra_tcp_port.filter(|p| *p > 0) {
            ports.push(PortMapping::any(port, "tcp"));
        }
        if agent.registry_mirror {
            ports.push(PortMapping::any(5001, "tcp"));
            ports.push(PortMapping::any(6443, "tcp"));
        }
        ports
    }
}

impl TaskBuilder for AgentBuilder {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn supports(&self, workload: &Workload) -> bool {
        *workload == Workload::Agent
    }

    fn build(&self, task_id: &TaskId, ctx: &BuildContext<'_>) -> Result<TaskRecord, BuildError> {
        let cfg = ctx.cfg;
        let agent = &cfg.agent;
        if agent.restrict_disk && agent.disk_limit <= 0.0 {
            return Err(BuildError::InvalidConfig(format!(
                "agent.disk_limit {} must be positive when restrict_disk is set",
                agent.disk_limit
            )));
        }

        let resources = Resources {
            cpus: agent.cpus,
            mem: agent.mem,
            disk: agent.disk,
        };
        let mut rec = common::base_record(task_id, Workload::Agent, resources, &agent.labels, ctx);
        if cfg.framework.enforce_limits {
            rec.limits = Some(Limits {
                cpus: agent.cpu_limit,
                mem: agent.mem_limit,
            });
        }

        let spec = &mut rec.container;
        spec.image = cfg.docker.image.clone();
        spec.shell = false;
        spec.privileged = true;
        spec.command = Some(BOOTSTRAP.into());
        spec.arguments = Self::arguments(task_id, ctx);

        common::add_runtime_parameters(spec, agent.mem, ctx);
        if agent.restrict_disk {
            spec.add_parameter("storage-opt", format!("size={:.0}mb", agent.disk_limit));
        }
        if let Some(runtime) = agent.custom_runtime.as_deref().filter(|r| !r.is_empty()) {
            spec.add_parameter("runtime", runtime);
        }
        common::add_net_alias(spec, Role::Agent, ctx);
        spec.uris.push(common::bootstrap_uri(ctx));
        common::add_cgroup(spec, ctx);
        for path in SNAPSHOTTERS {
            spec.volumes.push(common::volume(path, path, ctx));
        }

        spec.ports = Self::ports(ctx);
        let prefix = cfg.framework.name.to_lowercase();
        rec.discovery.ports = spec
            .ports
            .iter()
            .map(|p| DiscoveryPort {
                number: p.container_port,
                name: format!("{prefix}-{}", p.protocol),
                protocol: p.protocol.clone(),
            })
            .collect();

        let mut env = common::base_env(Role::Agent, ctx)
            .with("KUBERNETES_VERSION", cfg.framework.kubernetes_version.as_str())
            .with("K3SFRAMEWORK_TYPE", "agent")
            .with("K3S_TOKEN", cfg.framework.token.as_str())
            .with("K3S_URL", cfg.server_url())
            .with("TZ", cfg.framework.timezone.as_str())
            .with("MESOS_TASK_ID", task_id.as_str());
        env.extend(agent.env.iter().map(|kv| (kv.key(), kv.value())));
        spec.env = env;

        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use keel_model::{FrameworkState, KeyValue};

    use super::*;
    use crate::config::Config;

    fn build(cfg: &Config) -> Result<TaskRecord, BuildError> {
        let fw = FrameworkState::default();
        let used = BTreeSet::new();
        let ctx = BuildContext {
            cfg,
            framework: &fw,
            used_ports: &used,
            now: 1,
        };
        AgentBuilder.build(&TaskId::from("a-1"), &ctx)
    }

    #[test]
    fn agent_arguments_carry_task_id() {
        let mut cfg = Config::default();
        cfg.agent.args = "/usr/local/bin/k3s  agent".into();
        cfg.agent.enable_taint = true;
        let rec = build(&cfg).unwrap();

        assert_eq!(rec.container.command.as_deref(), Some(BOOTSTRAP));
        assert!(!rec.container.shell);
        assert_eq!(
            rec.container.arguments,
            [
                "/usr/local/bin/k3s",
                "agent",
                "--with-node-id a-1",
                "--kubelet-arg node-labels keel.dev/taskid=a-1",
                "--node-taint node.kubernetes.io/unschedulable=true:NoSchedule",
            ]
        );
        assert_eq!(rec.container.env.get("MESOS_TASK_ID"), Some("a-1"));
    }

    #[test]
    fn ports_and_discovery_names() {
        let mut cfg = Config::default();
        cfg.framework.name = "Edge".into();
        cfg.agent.extra_tcp_port = Some(9000);
        cfg.agent.registry_mirror = true;
        let rec = build(&cfg).unwrap();

        let containers: Vec<_> = rec.container.ports.iter().map(|p| p.container_port).collect();
        assert_eq!(containers, [80, 443, 9000, 5001, 6443]);
        assert!(rec.container.ports.iter().all(PortMapping::is_dynamic));
        assert_eq!(rec.discovery.ports[0].name, "edge-http");
        assert_eq!(rec.discovery.ports[1].protocol, "https");
        assert_eq!(rec.container.arguments.last().map(String::as_str), Some("--embedded-registry"));
    }

    #[test]
    fn env_overrides_are_appended_verbatim() {
        let mut cfg = Config::default();
        cfg.agent.env = vec![
            KeyValue::new("TZ", "Europe/Berlin"),
            KeyValue::new("HTTP_PROXY", "http://proxy:3128"),
        ];
        let rec = build(&cfg).unwrap();

        let env = &rec.container.env;
        assert_eq!(env.get("TZ"), Some("Europe/Berlin"));
        assert_eq!(env.get("HTTP_PROXY"), Some("http://proxy:3128"));
        let keys: Vec<_> = env.iter().map(|kv| kv.key()).collect();
        assert_eq!(keys[0], "SERVICE_NAME");
        assert_eq!(keys.iter().filter(|k| **k == "TZ").count(), 2);
    }

    #[test]
    fn limits_and_storage_options() {
        let mut cfg = Config::default();
        cfg.framework.enforce_limits = true;
        cfg.agent.restrict_disk = true;
        cfg.agent.disk_limit = 5000.0;
        cfg.agent.custom_runtime = Some("sysbox-runc".into());
        let rec = build(&cfg).unwrap();

        assert_eq!(rec.limits, Some(Limits { cpus: 2.0, mem: 4096.0 }));
        assert_eq!(rec.container.parameter_values("storage-opt").next(), Some("size=5000mb"));
        assert_eq!(rec.container.parameter_values("runtime").next(), Some("sysbox-runc"));
        assert_eq!(rec.container.volumes.len(), 2);
    }

    #[test]
    fn restricted_disk_needs_a_limit() {
        let mut cfg = Config::default();
        cfg.agent.restrict_disk = true;
        cfg.agent.disk_limit = 0.0;
        assert!(matches!(build(&cfg), Err(BuildError::InvalidConfig(_))));
    }
}
