use serde::{Deserialize, Serialize};

use super::{AgentId, FrameworkId, NetworkInfo, OfferId, Range, Resource, TaskId};
use crate::MesosError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Subscribed,
    Offers,
    InverseOffers,
    Rescind,
    RescindInverseOffer,
    Update,
    UpdateOperationStatus,
    Message,
    Failure,
    Error,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribed {
    pub framework_id: FrameworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub framework_id: FrameworkId,
    pub agent_id: AgentId,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Offer {
    /// Sum of a scalar resource across all entries with that name.
    pub fn scalar(&self, name: &str) -> f64 {
        self.resources
            .iter()
            .filter(|r| r.name == name)
            .filter_map(|r| r.scalar.map(|s| s.value))
            .sum()
    }

    pub fn port_ranges(&self) -> Vec<Range> {
        self.resources
            .iter()
            .filter(|r| r.name == "ports")
            .filter_map(|r| r.ranges.as_ref())
            .flat_map(|r| r.range.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Offers {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContainerStatus {
    #[serde(default)]
    pub network_infos: Vec<NetworkInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_status: Option<ContainerStatus>,
}

impl TaskStatus {
    /// First container IP reported by the agent, if any.
    pub fn ip_address(&self) -> Option<&str> {
        self.container_status
            .as_ref()?
            .network_infos
            .iter()
            .flat_map(|n| n.ip_addresses.iter())
            .find_map(|ip| ip.ip_address.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rescind {
    pub offer_id: OfferId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// Raw inbound event as framed on the subscription stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<Subscribed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offers: Option<Offers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Update>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescind: Option<Rescind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMessage>,
}

impl Event {
    pub fn decode(record: &[u8]) -> Result<Self, MesosError> {
        Ok(serde_json::from_slice(record)?)
    }
}

/// Event with its payload checked against its type.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Subscribed(Subscribed),
    Offers(Vec<Offer>),
    Update(TaskStatus),
    Rescind(OfferId),
    Heartbeat,
    Error(String),
    Other(EventType),
}

impl TryFrom<Event> for SchedulerEvent {
    type Error = MesosError;

    fn try_from(ev: Event) -> Result<Self, MesosError> {
        fn missing(kind: &str) -> MesosError {
            MesosError::Protocol(format!("{kind} event without payload"))
        }

        Ok(match ev.kind {
            EventType::Subscribed => {
                Self::Subscribed(ev.subscribed.ok_or_else(|| missing("SUBSCRIBED"))?)
            }
            EventType::Offers => Self::Offers(ev.offers.ok_or_else(|| missing("OFFERS"))?.offers),
            EventType::Update => Self::Update(ev.update.ok_or_else(|| missing("UPDATE"))?.status),
            EventType::Rescind => {
                Self::Rescind(ev.rescind.ok_or_else(|| missing("RESCIND"))?.offer_id)
            }
            EventType::Heartbeat => Self::Heartbeat,
            EventType::Error => {
                SchedulerEvent::Error(ev.error.map(|e| e.message).unwrap_or_default())
            }
            other => Self::Other(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_offers_event() {
        let raw = br#"{
            "type": "OFFERS",
            "offers": {"offers": [{
                "id": {"value": "o-1"},
                "framework_id": {"value": "fw"},
                "agent_id": {"value": "a-1"},
                "hostname": "node-1",
                "url": {"scheme": "http"},
                "resources": [
                    {"name": "cpus", "type": "SCALAR", "scalar": {"value": 2.0}, "role": "*"},
                    {"name": "cpus", "type": "SCALAR", "scalar": {"value": 1.5}},
                    {"name": "mem", "type": "SCALAR", "scalar": {"value": 4096}},
                    {"name": "ports", "type": "RANGES", "ranges": {"range": [{"begin": 31000, "end": 31005}]}}
                ]
            }]}
        }"#;

        let ev = SchedulerEvent::try_from(Event::decode(raw).unwrap()).unwrap();
        let SchedulerEvent::Offers(offers) = ev else {
            panic!("expected offers");
        };
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].scalar("cpus"), 3.5);
        assert_eq!(offers[0].scalar("mem"), 4096.0);
        assert_eq!(offers[0].scalar("disk"), 0.0);
        assert_eq!(offers[0].port_ranges(), vec![Range { begin: 31000, end: 31005 }]);
    }

    #[test]
    fn decode_update_with_ip() {
        let raw = br#"{
            "type": "UPDATE",
            "update": {"status": {
                "task_id": {"value": "t-1"},
                "state": "TASK_RUNNING",
                "agent_id": {"value": "a-1"},
                "uuid": "AAEC",
                "container_status": {"network_infos": [{"ip_addresses": [{"ip_address": "10.0.0.7"}]}]}
            }}
        }"#;

        let ev = SchedulerEvent::try_from(Event::decode(raw).unwrap()).unwrap();
        let SchedulerEvent::Update(status) = ev else {
            panic!("expected update");
        };
        assert_eq!(status.state, "TASK_RUNNING");
        assert_eq!(status.uuid.as_deref(), Some("AAEC"));
        assert_eq!(status.ip_address(), Some("10.0.0.7"));
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let ev = Event::decode(br#"{"type": "SOMETHING_NEW"}"#).unwrap();
        assert_eq!(ev.kind, EventType::Unknown);
        assert_eq!(
            SchedulerEvent::try_from(ev).unwrap(),
            SchedulerEvent::Other(EventType::Unknown)
        );
    }

    #[test]
    fn subscribed_without_payload_is_protocol_error() {
        let ev = Event::decode(br#"{"type": "SUBSCRIBED"}"#).unwrap();
        assert!(matches!(
            SchedulerEvent::try_from(ev),
            Err(MesosError::Protocol(_))
        ));
    }

    #[test]
    fn error_event_keeps_message() {
        let ev = Event::decode(br#"{"type": "ERROR", "error": {"message": "framework removed"}}"#)
            .unwrap();
        assert_eq!(
            SchedulerEvent::try_from(ev).unwrap(),
            SchedulerEvent::Error("framework removed".into())
        );
    }
}
