//! Fitting one pending record into one offer.

use std::collections::BTreeSet;
use std::fmt;

use keel_mesos::proto::{Offer, Range};
use keel_model::{PortMapping, TaskRecord};

/// Why a record did not fit an offer.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Scalar {
        name: &'static str,
        need: f64,
        have: f64,
    },
    /// The fixed host port is not offered (or taken twice by the record).
    Port(u32),
    /// No offered port left for a dynamic mapping.
    NoFreePort { container_port: u32 },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Scalar { name, need, have } => write!(f, "{name}: need {need}, have {have}"),
            Mismatch::Port(p) => write!(f, "host port {p} not offered"),
            Mismatch::NoFreePort { container_port } => {
                write!(f, "no free host port for container port {container_port}")
            }
        }
    }
}

/// Check `rec` against `offer`.
///
/// On success returns the record's port mappings with every dynamic host
/// port resolved to a concrete offered port.
pub fn fit(offer: &Offer, rec: &TaskRecord) -> Result<Vec<PortMapping>, Mismatch> {
    let need = &rec.resources;
    for (name, need) in [("cpus", need.cpus), ("mem", need.mem), ("disk", need.disk)] {
        if need <= 0.0 {
            continue;
        }
        let have = offer.scalar(name);
        if have < need {
            return Err(Mismatch::Scalar { name, need, have });
        }
    }

    let ranges = offer.port_ranges();
    let mut taken = BTreeSet::new();
    let mut resolved = Vec::with_capacity(rec.container.ports.len());

    for mapping in &rec.container.ports {
        let host_port = if mapping.is_dynamic() {
            first_free(&ranges, &taken).ok_or(Mismatch::NoFreePort {
                container_port: mapping.container_port,
            })?
        } else {
            let p = mapping.host_port;
            if taken.contains(&p) || !ranges.iter().any(|r| r.contains(p as u64)) {
                return Err(Mismatch::Port(p));
            }
            p
        };
        taken.insert(host_port);
        resolved.push(PortMapping {
            host_port,
            ..mapping.clone()
        });
    }
    Ok(resolved)
}

fn first_free(ranges: &[Range], taken: &BTreeSet<u32>) -> Option<u32> {
    ranges
        .iter()
        .flat_map(|r| r.begin..=r.end)
        .filter(|p| *p > 0 && *p <= u16::MAX as u64)
        .map(|p| p as u32)
        .find(|p| !taken.contains(p))
}

#[cfg(test)]
mod tests {
    use keel_mesos::proto::{Id, Resource};
    use keel_model::{
        ContainerSpec, Discovery, Resources, TaskId, TaskState, Workload,
    };

    use super::*;

    fn offer(cpus: f64, mem: f64, disk: f64, ports: Vec<Range>) -> Offer {
        Offer {
            id: Id::new("o-1"),
            framework_id: Id::new("fw"),
            agent_id: Id::new("agent-1"),
            hostname: "node-1".into(),
            resources: vec![
                Resource::scalar("cpus", cpus),
                Resource::scalar("mem", mem),
                Resource::scalar("disk", disk),
                Resource::ranges("ports", ports),
            ],
        }
    }

    fn record(ports: Vec<PortMapping>) -> TaskRecord {
        TaskRecord {
            id: TaskId::from("t-1"),
            name: "keel:agent".into(),
            framework: "keel".into(),
            workload: Workload::Agent,
            resources: Resources {
                cpus: 1.0,
                mem: 1024.0,
                disk: 100.0,
            },
            limits: None,
            container: ContainerSpec {
                ports,
                ..ContainerSpec::default()
            },
            discovery: Discovery::default(),
            labels: Vec::new(),
            instances: 1,
            state: TaskState::New,
            agent_id: None,
            agent_hostname: None,
            address: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn dynamic_ports_take_lowest_free() {
        let o = offer(2.0, 2048.0, 1000.0, vec![Range { begin: 31000, end: 31002 }]);
        let rec = record(vec![PortMapping::any(80, "http"), PortMapping::any(443, "https")]);

        let ports = fit(&o, &rec).unwrap();
        assert_eq!(ports[0].host_port, 31000);
        assert_eq!(ports[1].host_port, 31001);
        assert_eq!(ports[1].container_port, 443);
    }

    #[test]
    fn fixed_port_must_be_offered() {
        let o = offer(2.0, 2048.0, 1000.0, vec![Range { begin: 31000, end: 31010 }]);

        let ok = record(vec![PortMapping::fixed(31005, 6443, "tcp"), PortMapping::any(8080, "tcp")]);
        let ports = fit(&o, &ok).unwrap();
        assert_eq!(ports[0].host_port, 31005);
        assert_eq!(ports[1].host_port, 31000);

        let missing = record(vec![PortMapping::fixed(31862, 6443, "tcp")]);
        assert_eq!(fit(&o, &missing), Err(Mismatch::Port(31862)));
    }

    #[test]
    fn fixed_port_is_not_reused_by_dynamic() {
        let o = offer(2.0, 2048.0, 1000.0, vec![Range { begin: 31000, end: 31001 }]);
        let rec = record(vec![PortMapping::fixed(31000, 2379, "tcp"), PortMapping::any(80, "tcp")]);

        let ports = fit(&o, &rec).unwrap();
        assert_eq!(ports[1].host_port, 31001);
    }

    #[test]
    fn insufficient_scalars() {
        let o = offer(0.5, 2048.0, 1000.0, vec![]);
        let rec = record(vec![]);
        assert!(matches!(fit(&o, &rec), Err(Mismatch::Scalar { name: "cpus", .. })));

        let o = offer(2.0, 512.0, 1000.0, vec![]);
        assert!(matches!(fit(&o, &rec), Err(Mismatch::Scalar { name: "mem", .. })));
    }

    #[test]
    fn no_ports_left() {
        let o = offer(2.0, 2048.0, 1000.0, vec![Range { begin: 31000, end: 31000 }]);
        let rec = record(vec![PortMapping::any(80, "http"), PortMapping::any(443, "https")]);
        assert_eq!(
            fit(&o, &rec),
            Err(Mismatch::NoFreePort { container_port: 443 })
        );
    }
}
