use serde::{Deserialize, Serialize};

/// Scalar resources a task asks the manager for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Resources {
    /// CPU shares.
    pub cpus: f64,
    /// Memory in MB.
    pub mem: f64,
    /// Disk in MB.
    pub disk: f64,
}

/// Hard limits enforced by the manager on top of the requested resources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub cpus: f64,
    pub mem: f64,
}

/// One container port published on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Host port; `0` means "any free port from the offer".
    pub host_port: u32,
    pub container_port: u32,
    /// Declared protocol (`tcp`, `udp`, `http`, `https`, ...).
    pub protocol: String,
}

impl PortMapping {
    pub fn any(container_port: u32, protocol: impl Into<String>) -> Self {
        Self {
            host_port: 0,
            container_port,
            protocol: protocol.into(),
        }
    }

    pub fn fixed(host_port: u32, container_port: u32, protocol: impl Into<String>) -> Self {
        Self {
            host_port,
            container_port,
            protocol: protocol.into(),
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.host_port == 0
    }

    /// Protocol as the container runtime understands it (`tcp` or `udp`).
    pub fn runtime_protocol(&self) -> &str {
        match self.protocol.as_str() {
            "udp" => "udp",
            _ => "tcp",
        }
    }
}
