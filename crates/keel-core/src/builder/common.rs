//! Pieces shared by the role builders.

use keel_model::{
    ContainerSpec, Discovery, KeyValue, NetworkMode, Resources, Role, TaskEnv, TaskId, TaskRecord,
    TaskState, Uri, Visibility, Volume, VolumeMode, Workload,
};

use super::BuildContext;

/// Docker network the manager attaches every container to by default.
const DEFAULT_DOCKER_NETWORK: &str = "bridge";

/// Record skeleton every builder fills in.
pub(crate) fn base_record(
    task_id: &TaskId,
    workload: Workload,
    resources: Resources,
    labels: &[KeyValue],
    ctx: &BuildContext<'_>,
) -> TaskRecord {
    let role = workload.role();
    let fw = &ctx.cfg.framework.name;
    let name = role.qualified(fw);
    let (network, network_name) = network(ctx);

    TaskRecord {
        id: task_id.clone(),
        name: name.clone(),
        framework: fw.clone(),
        workload,
        resources,
        limits: None,
        container: ContainerSpec {
            hostname: ctx.cfg.hostname_of(role),
            network,
            network_name,
            force_pull: ctx.cfg.docker.force_pull,
            ..ContainerSpec::default()
        },
        discovery: Discovery {
            name,
            visibility: Visibility::External,
            ports: Vec::new(),
        },
        labels: labels.to_vec(),
        instances: ctx.cfg.desired(role),
        state: TaskState::Unset,
        agent_id: None,
        agent_hostname: None,
        address: None,
        created_at: ctx.now,
        updated_at: ctx.now,
    }
}

/// Whether containers join a user-defined docker network.
pub(crate) fn on_user_network(ctx: &BuildContext<'_>) -> bool {
    ctx.framework.mesos_cni.is_none() && ctx.cfg.docker.cni != DEFAULT_DOCKER_NETWORK
}

/// Network mode and CNI name for a new container.
pub(crate) fn network(ctx: &BuildContext<'_>) -> (NetworkMode, Option<String>) {
    if let Some(cni) = &ctx.framework.mesos_cni {
        return (NetworkMode::Bridge, Some(cni.clone()));
    }
    if on_user_network(ctx) {
        return (NetworkMode::User, Some(ctx.cfg.docker.cni.clone()));
    }
    (NetworkMode::Bridge, None)
}

/// Resolve `<fw><role>` inside a user-defined network.
pub(crate) fn add_net_alias(spec: &mut ContainerSpec, role: Role, ctx: &BuildContext<'_>) {
    if on_user_network(ctx) {
        spec.add_parameter(
            "net-alias",
            format!("{}{}", ctx.cfg.framework.name, role.as_str()),
        );
    }
}

/// Parameters every control-plane and worker container runs with.
pub(crate) fn add_runtime_parameters(spec: &mut ContainerSpec, mem: f64, ctx: &BuildContext<'_>) {
    let docker = &ctx.cfg.docker;
    spec.add_parameter("cap-add", "NET_ADMIN");
    spec.add_parameter("cap-add", "SYS_ADMIN");
    spec.add_parameter("shm-size", docker.shm_size.as_str());
    spec.add_parameter(
        "memory-swap",
        format!("{:.0}g", (docker.memory_swap + mem) / 1024.0),
    );
    spec.add_parameter("ulimit", format!("nofile={}", docker.ulimit));
}

/// Host cgroup namespace, needed by k3s on cgroup v2 hosts.
pub(crate) fn add_cgroup(spec: &mut ContainerSpec, ctx: &BuildContext<'_>) {
    if !ctx.cfg.docker.cgroup_v2 {
        return;
    }
    spec.add_parameter("cgroupns", "host");
    spec.volumes.push(Volume {
        container_path: "/sys/fs/cgroup".into(),
        mode: VolumeMode::Rw,
        driver: ctx.cfg.docker.volume_driver.clone(),
        name: "/sys/fs/cgroup".into(),
    });
}

pub(crate) fn volume(container_path: &str, name: &str, ctx: &BuildContext<'_>) -> Volume {
    Volume {
        container_path: container_path.into(),
        mode: VolumeMode::Rw,
        driver: ctx.cfg.docker.volume_driver.clone(),
        name: name.into(),
    }
}

/// Bootstrap script fetched into the sandbox as `bootstrap`.
pub(crate) fn bootstrap_uri(ctx: &BuildContext<'_>) -> Uri {
    Uri {
        value: ctx.cfg.bootstrap.url.clone(),
        extract: false,
        executable: true,
        cache: false,
        output_file: Some("bootstrap".into()),
    }
}

/// Variables every role starts with.
pub(crate) fn base_env(role: Role, ctx: &BuildContext<'_>) -> TaskEnv {
    TaskEnv::new().with("SERVICE_NAME", role.qualified(&ctx.cfg.framework.name))
}
