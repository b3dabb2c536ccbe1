//! Translation of stored task records into launch descriptors.

use std::collections::BTreeMap;

use keel_model::{ContainerSpec, Discovery, NetworkMode, TaskRecord, Visibility};

use crate::proto::{
    AgentId, CommandInfo, CommandUri, ContainerInfo, ContainerType, DiscoveryInfo,
    DiscoveryVisibility, DockerInfo, DockerNetwork, DockerParameter, DockerPortMapping,
    DockerVolume, Environment, Id, Label, Labels, NetworkInfo, Port, Ports, Range, Resource,
    Scalar, TaskInfo, Variable, Volume, VolumeMode, VolumeSource, VolumeSourceType,
};

/// Build the `TaskInfo` launching `record` on `agent_id`.
///
/// Host ports must already be resolved; a mapping still at `0` is sent as
/// is and the manager will reject it. Discovery ports declared against a
/// container port are published under the resolved host port.
pub fn task_info(record: &TaskRecord, agent_id: &AgentId) -> TaskInfo {
    let c = &record.container;

    let mut resources = vec![
        Resource::scalar("cpus", record.resources.cpus),
        Resource::scalar("mem", record.resources.mem),
    ];
    if record.resources.disk > 0.0 {
        resources.push(Resource::scalar("disk", record.resources.disk));
    }
    let host_ports: Vec<Range> = c
        .ports
        .iter()
        .filter(|p| !p.is_dynamic())
        .map(|p| Range::single(p.host_port as u64))
        .collect();
    if !host_ports.is_empty() {
        resources.push(Resource::ranges("ports", host_ports));
    }

    let limits = record
        .limits
        .map(|l| {
            BTreeMap::from([
                ("cpus".to_string(), Scalar { value: l.cpus }),
                ("mem".to_string(), Scalar { value: l.mem }),
            ])
        })
        .unwrap_or_default();

    let labels = (!record.labels.is_empty()).then(|| Labels {
        labels: record
            .labels
            .iter()
            .map(|kv| Label {
                key: kv.key().to_string(),
                value: Some(kv.value().to_string()),
            })
            .collect(),
    });

    TaskInfo {
        name: record.name.clone(),
        task_id: Id::new(record.id.as_str()),
        agent_id: agent_id.clone(),
        resources,
        command: Some(command_info(c)),
        container: Some(container_info(c)),
        discovery: discovery_info(&record.discovery, c),
        labels,
        limits,
    }
}

fn command_info(c: &ContainerSpec) -> CommandInfo {
    let environment = (!c.env.is_empty()).then(|| Environment {
        variables: c
            .env
            .iter()
            .map(|kv| Variable {
                name: kv.key().to_string(),
                value: kv.value().to_string(),
            })
            .collect(),
    });

    CommandInfo {
        shell: c.shell,
        value: c.command.clone(),
        arguments: c.arguments.clone(),
        uris: c
            .uris
            .iter()
            .map(|u| CommandUri {
                value: u.value.clone(),
                extract: u.extract,
                executable: u.executable,
                cache: u.cache,
                output_file: u.output_file.clone(),
            })
            .collect(),
        environment,
    }
}

fn container_info(c: &ContainerSpec) -> ContainerInfo {
    let network = match c.network {
        NetworkMode::Bridge => DockerNetwork::Bridge,
        NetworkMode::Host => DockerNetwork::Host,
        NetworkMode::User => DockerNetwork::User,
        NetworkMode::None => DockerNetwork::None,
    };

    // Host networking publishes nothing; port mappings would be rejected.
    let port_mappings = match c.network {
        NetworkMode::Bridge | NetworkMode::User => c
            .ports
            .iter()
            .map(|p| DockerPortMapping {
                host_port: p.host_port,
                container_port: p.container_port,
                protocol: Some(p.runtime_protocol().to_string()),
            })
            .collect(),
        NetworkMode::Host | NetworkMode::None => Vec::new(),
    };

    let network_infos = c
        .network_name
        .as_ref()
        .map(|name| {
            vec![NetworkInfo {
                name: Some(name.clone()),
                ip_addresses: Vec::new(),
            }]
        })
        .unwrap_or_default();

    ContainerInfo {
        kind: ContainerType::Docker,
        volumes: c
            .volumes
            .iter()
            .map(|v| Volume {
                container_path: v.container_path.clone(),
                mode: match v.mode {
                    keel_model::VolumeMode::Rw => VolumeMode::Rw,
                    keel_model::VolumeMode::Ro => VolumeMode::Ro,
                },
                source: Some(VolumeSource {
                    kind: VolumeSourceType::DockerVolume,
                    docker_volume: Some(DockerVolume {
                        driver: (!v.driver.is_empty()).then(|| v.driver.clone()),
                        name: v.name.clone(),
                    }),
                }),
            })
            .collect(),
        hostname: (!c.hostname.is_empty() && c.network != NetworkMode::Host)
            .then(|| c.hostname.clone()),
        docker: Some(DockerInfo {
            image: c.image.clone(),
            network,
            port_mappings,
            privileged: c.privileged,
            parameters: c
                .parameters
                .iter()
                .map(|p| DockerParameter {
                    key: p.key.clone(),
                    value: p.value.clone(),
                })
                .collect(),
            force_pull_image: c.force_pull,
        }),
        network_infos,
    }
}

fn discovery_info(d: &Discovery, c: &ContainerSpec) -> Option<DiscoveryInfo> {
    if d.name.is_empty() && d.ports.is_empty() {
        return None;
    }

    let ports = d
        .ports
        .iter()
        .map(|dp| {
            let number = c
                .ports
                .iter()
                .find(|p| p.container_port == dp.number)
                .map(|p| p.host_port)
                .unwrap_or(dp.number);
            Port {
                number,
                name: Some(dp.name.clone()),
                protocol: Some(dp.protocol.clone()),
            }
        })
        .collect();

    Some(DiscoveryInfo {
        visibility: match d.visibility {
            Visibility::Framework => DiscoveryVisibility::Framework,
            Visibility::Cluster => DiscoveryVisibility::Cluster,
            Visibility::External => DiscoveryVisibility::External,
        },
        name: (!d.name.is_empty()).then(|| d.name.clone()),
        ports: Some(Ports { ports }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_model::{
        DiscoveryPort, KeyValue, Limits, PortMapping, Resources, TaskEnv, TaskId, TaskState,
        Workload,
    };

    fn agent_record() -> TaskRecord {
        let container = ContainerSpec {
            image: "rancher/k3s:v1.30".into(),
            command: Some("/mnt/mesos/sandbox/bootstrap".into()),
            arguments: vec!["agent".into(), "--with-node-id".into(), "t-1".into()],
            privileged: true,
            hostname: "keelagent".into(),
            network: NetworkMode::User,
            network_name: Some("weave".into()),
            ports: vec![
                PortMapping::fixed(31080, 80, "http"),
                PortMapping::fixed(31443, 443, "https"),
                PortMapping::fixed(31053, 53, "udp"),
            ],
            env: TaskEnv::new().with("K3SFRAMEWORK_TYPE", "agent"),
            ..Default::default()
        };

        TaskRecord {
            id: TaskId::from("t-1"),
            name: "keel:agent".into(),
            framework: "keel".into(),
            workload: Workload::Agent,
            resources: Resources {
                cpus: 1.0,
                mem: 2048.0,
                disk: 0.0,
            },
            limits: Some(Limits {
                cpus: 2.0,
                mem: 4096.0,
            }),
            container,
            discovery: Discovery {
                name: "keel:agent".into(),
                visibility: Visibility::External,
                ports: vec![
                    DiscoveryPort {
                        number: 80,
                        name: "keel-http".into(),
                        protocol: "http".into(),
                    },
                    DiscoveryPort {
                        number: 53,
                        name: "keel-udp".into(),
                        protocol: "udp".into(),
                    },
                ],
            },
            labels: vec![KeyValue::new("traefik.enable", "true")],
            instances: 1,
            state: TaskState::New,
            agent_id: None,
            agent_hostname: None,
            address: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn protocols_normalised_for_runtime_only() {
        let info = task_info(&agent_record(), &Id::new("a-1"));

        let docker = info.container.as_ref().unwrap().docker.as_ref().unwrap();
        let protos: Vec<_> = docker
            .port_mappings
            .iter()
            .map(|m| m.protocol.as_deref().unwrap())
            .collect();
        assert_eq!(protos, ["tcp", "tcp", "udp"]);

        let disc = info.discovery.unwrap().ports.unwrap().ports;
        assert_eq!(disc[0].number, 31080);
        assert_eq!(disc[0].protocol.as_deref(), Some("http"));
        assert_eq!(disc[1].number, 31053);
    }

    #[test]
    fn resources_and_limits() {
        let info = task_info(&agent_record(), &Id::new("a-1"));

        let names: Vec<_> = info.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["cpus", "mem", "ports"]);
        let ports = info.resources[2].ranges.as_ref().unwrap();
        assert_eq!(ports.range.len(), 3);
        assert!(ports.range.contains(&Range::single(31443)));

        assert_eq!(info.limits["cpus"].value, 2.0);
        assert_eq!(info.limits["mem"].value, 4096.0);
    }

    #[test]
    fn user_network_and_env() {
        let info = task_info(&agent_record(), &Id::new("a-1"));
        let container = info.container.unwrap();

        assert_eq!(container.docker.unwrap().network, DockerNetwork::User);
        assert_eq!(container.network_infos[0].name.as_deref(), Some("weave"));
        assert_eq!(container.hostname.as_deref(), Some("keelagent"));

        let env = info.command.unwrap().environment.unwrap();
        assert_eq!(env.variables[0].name, "K3SFRAMEWORK_TYPE");
        assert_eq!(info.labels.unwrap().labels[0].key, "traefik.enable");
    }

    #[test]
    fn serialises_to_manager_json() {
        let v = serde_json::to_value(task_info(&agent_record(), &Id::new("a-1"))).unwrap();
        assert_eq!(v["task_id"]["value"], "t-1");
        assert_eq!(v["agent_id"]["value"], "a-1");
        assert_eq!(v["container"]["type"], "DOCKER");
        assert_eq!(v["container"]["docker"]["network"], "USER");
        assert_eq!(v["discovery"]["visibility"], "EXTERNAL");
        assert_eq!(v["resources"][0]["type"], "SCALAR");
    }
}
