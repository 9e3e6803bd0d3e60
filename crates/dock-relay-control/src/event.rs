//! Raw and enriched docker events.

use dock_relay_core::{org_from_node_name, HostAddr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Node descriptor carried by cluster-level `engine_connect` / `engine_disconnect` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node name, `<hostname>.<org>`.
    #[serde(rename = "Name")]
    pub name: String,
    /// Docker daemon address of the node.
    #[serde(rename = "Addr")]
    pub addr: String,
    /// Node ID.
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Node IP.
    #[serde(rename = "Ip", default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// An event as written by a docker `/events` stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    /// Event type (`create`, `start`, `die`, `engine_connect`, ...).
    pub status: String,
    /// Container ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Image the container runs.
    #[serde(default)]
    pub from: Option<String>,
    /// Event time (unix seconds).
    #[serde(default)]
    pub time: u64,
    /// Event time (unix nanoseconds).
    #[serde(rename = "timeNano", default)]
    pub time_nano: Option<u64>,
    /// Node descriptor, on cluster-level events.
    #[serde(default)]
    pub node: Option<NodeInfo>,
}

impl RawEvent {
    /// Decode one event frame.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::MalformedEvent` if the frame is not a docker event.
    pub fn parse(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }
}

/// A docker event with host, org and inspection data attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    /// Event type.
    pub status: String,
    /// Container ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Image the container runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Event time (unix seconds).
    pub time: u64,
    /// Event time (unix nanoseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_nano: Option<u64>,
    /// Node descriptor, on cluster-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeInfo>,
    /// Unique ID stamped on every enriched event.
    pub uuid: String,
    /// Host IP.
    pub ip: String,
    /// Host docker port.
    pub docker_port: u16,
    /// Host URL, `http://ip:port`.
    pub host: String,
    /// Same value as `host`.
    pub docker_url: String,
    /// Org owning the host.
    pub org: Option<String>,
    /// Same value as `org`.
    pub tags: Option<String>,
    /// Container inspection document, on lifecycle events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspect_data: Option<serde_json::Value>,
}

impl EnrichedEvent {
    /// The host the event is about.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Internal` if the stored URL is not a host address.
    pub fn host_addr(&self) -> Result<HostAddr> {
        HostAddr::parse(&self.host).map_err(|e| RelayError::Internal(e.to_string()))
    }

    /// The `type` label of the inspected container, if any.
    #[must_use]
    pub fn container_type(&self) -> Option<&str> {
        self.inspect_data
            .as_ref()?
            .pointer("/Config/Labels/type")?
            .as_str()
    }
}

/// Normalize a raw event received on `source`'s stream.
///
/// Events carrying a node descriptor are about that node: host and org come from
/// the node's address and name. Other events are about the stream's own host and
/// take `org` from the caller.
///
/// # Errors
///
/// Returns `RelayError::MalformedEvent` if the node address cannot be parsed.
pub fn format_event(raw: RawEvent, source: &HostAddr, org: Option<&str>) -> Result<EnrichedEvent> {
    let (host, org) = match &raw.node {
        Some(node) => {
            let host = HostAddr::parse(&node.addr)
                .map_err(|e| RelayError::MalformedEvent(format!("node address: {e}")))?;
            let org = org_from_node_name(&node.name).or(org).map(str::to_string);
            (host, org)
        }
        None => (source.clone(), org.map(str::to_string)),
    };

    let url = host.to_url();

    Ok(EnrichedEvent {
        status: raw.status,
        id: raw.id,
        from: raw.from,
        time: raw.time,
        time_nano: raw.time_nano,
        node: raw.node,
        uuid: Uuid::new_v4().to_string(),
        ip: host.ip().to_string(),
        docker_port: host.port(),
        host: url.clone(),
        docker_url: url,
        tags: org.clone(),
        org,
        inspect_data: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swarm() -> HostAddr {
        HostAddr::parse("10.0.0.100:2375").unwrap()
    }

    #[test]
    fn formats_swarm_node_connect() {
        let raw = RawEvent::parse(
            r#"{"status":"engine_connect","time":1500,
                "node":{"Name":"ip-10-4-132-87.123123123","Id":"YP7Q","Addr":"10.4.132.87:4242","Ip":"10.4.132.87"}}"#,
        )
        .unwrap();

        let event = format_event(raw, &swarm(), None).unwrap();
        assert_eq!(event.org.as_deref(), Some("123123123"));
        assert_eq!(event.tags, event.org);
        assert_eq!(event.host, "http://10.4.132.87:4242");
        assert_eq!(event.host, event.docker_url);
        assert_eq!(event.ip, "10.4.132.87");
        assert_eq!(event.docker_port, 4242);
        assert!(!event.uuid.is_empty());
    }

    #[test]
    fn formats_host_event_with_passed_org() {
        let host = HostAddr::parse("10.4.145.68:4242").unwrap();
        let raw = RawEvent::parse(
            r#"{"status":"start","id":"abc","from":"ubuntu","time":1501,"timeNano":1501000000001}"#,
        )
        .unwrap();

        let event = format_event(raw, &host, Some("555")).unwrap();
        assert_eq!(event.host, "http://10.4.145.68:4242");
        assert_eq!(event.docker_url, event.host);
        assert_eq!(event.org.as_deref(), Some("555"));
        assert_eq!(event.id.as_deref(), Some("abc"));
        assert_eq!(event.time_nano, Some(1_501_000_000_001));
    }

    #[test]
    fn every_event_gets_its_own_uuid() {
        let host = HostAddr::parse("10.4.145.68:4242").unwrap();
        let raw = RawEvent::parse(r#"{"status":"start","id":"abc","time":1}"#).unwrap();
        let a = format_event(raw.clone(), &host, None).unwrap();
        let b = format_event(raw, &host, None).unwrap();
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn bad_node_address_is_malformed() {
        let raw = RawEvent::parse(
            r#"{"status":"engine_connect","time":1,"node":{"Name":"n.1","Addr":"nowhere"}}"#,
        )
        .unwrap();
        assert!(matches!(
            format_event(raw, &swarm(), None),
            Err(RelayError::MalformedEvent(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            RawEvent::parse("{not json"),
            Err(RelayError::MalformedEvent(_))
        ));
    }

    #[test]
    fn serializes_camel_case() {
        let host = HostAddr::parse("10.4.145.68:4242").unwrap();
        let raw = RawEvent::parse(r#"{"status":"start","id":"abc","time":1}"#).unwrap();
        let json = serde_json::to_value(format_event(raw, &host, Some("1")).unwrap()).unwrap();
        assert_eq!(json["dockerUrl"], "http://10.4.145.68:4242");
        assert_eq!(json["dockerPort"], 4242);
        assert!(json.get("inspectData").is_none());
    }
}
