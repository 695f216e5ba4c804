use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::TopologySnapshot;
use crate::{ClientPort, Error, Result, RouterName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ControlMessage {
    Register { router: RouterName },
    Probe,
    ProbeAck,
    TopologyQuery,
    TopologyReply(TopologySnapshot),
    SnapshotQuery,
    SnapshotReply(Option<RoutingSnapshot>),
    PathPush(RoutingSnapshot),
    RegisterClient { port: ClientPort },
    Shutdown,
    Data(DataMessage),
    Ready,
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Register { .. } => "register",
            ControlMessage::Probe => "probe",
            ControlMessage::ProbeAck => "probe_ack",
            ControlMessage::TopologyQuery => "topology_query",
            ControlMessage::TopologyReply(_) => "topology_reply",
            ControlMessage::SnapshotQuery => "snapshot_query",
            ControlMessage::SnapshotReply(_) => "snapshot_reply",
            ControlMessage::PathPush(_) => "path_push",
            ControlMessage::RegisterClient { .. } => "register_client",
            ControlMessage::Shutdown => "shutdown",
            ControlMessage::Data(_) => "data",
            ControlMessage::Ready => "ready",
        }
    }

    pub fn unexpected(&self) -> Error {
        Error::UnexpectedMessage(self.kind().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Text(String),
    // sealed chunks follow once the receiver answers Ready
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMessage {
    pub id: Uuid,
    pub sender_client: ClientPort,
    pub sender_router: RouterName,
    pub dest_client: ClientPort,
    pub dest_router: RouterName,
    pub body: Body,
}

impl DataMessage {
    pub fn text(
        sender_client: ClientPort,
        sender_router: &str,
        dest_client: ClientPort,
        dest_router: &str,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_client,
            sender_router: sender_router.to_string(),
            dest_client,
            dest_router: dest_router.to_string(),
            body: Body::Text(text.into()),
        }
    }

    pub fn attachment(
        sender_client: ClientPort,
        sender_router: &str,
        dest_client: ClientPort,
        dest_router: &str,
    ) -> Self {
        Self {
            body: Body::Attachment,
            ..Self::text(sender_client, sender_router, dest_client, dest_router, String::new())
        }
    }

    pub fn is_attachment(&self) -> bool {
        self.body == Body::Attachment
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub source: RouterName,
    pub destination: RouterName,
    pub path: Vec<RouterName>,
}

impl PathEntry {
    pub fn next_hop_after(&self, router: &str) -> Option<&str> {
        let position = self.path.iter().position(|hop| hop == router)?;
        self.path.get(position + 1).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<PathEntry>,
}

impl RoutingSnapshot {
    pub fn new(version: u64, entries: Vec<PathEntry>) -> Self {
        Self {
            version,
            generated_at: Utc::now(),
            entries,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn entry(&self, source: &str, destination: &str) -> Option<&PathEntry> {
        self.entries
            .iter()
            .find(|e| e.source == source && e.destination == destination)
    }

    pub fn next_hop(&self, router: &str, destination: &str) -> Result<RouterName> {
        self.entry(router, destination)
            .and_then(|entry| entry.next_hop_after(router))
            .map(str::to_string)
            .ok_or_else(|| Error::NoRoute {
                from: router.to_string(),
                to: destination.to_string(),
            })
    }

    pub fn mentions(&self, router: &str) -> bool {
        self.entries.iter().any(|e| e.path.iter().any(|hop| hop == router))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &[&str]) -> PathEntry {
        PathEntry {
            source: path[0].to_string(),
            destination: path[path.len() - 1].to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn next_hop_walks_the_path() {
        let long = entry(&["A", "B", "C", "D"]);
        assert_eq!(long.next_hop_after("A"), Some("B"));
        assert_eq!(long.next_hop_after("B"), Some("C"));
        assert_eq!(long.next_hop_after("C"), Some("D"));
        assert_eq!(long.next_hop_after("D"), None);
        assert_eq!(long.next_hop_after("X"), None);

        let snapshot = RoutingSnapshot::new(
            1,
            vec![long, entry(&["B", "C", "D"]), entry(&["C", "D"])],
        );
        assert_eq!(snapshot.next_hop("A", "D").unwrap(), "B");
        assert_eq!(snapshot.next_hop("B", "D").unwrap(), "C");
        assert_eq!(snapshot.next_hop("C", "D").unwrap(), "D");
    }

    #[test]
    fn missing_entry_is_no_route() {
        let snapshot = RoutingSnapshot::new(1, vec![entry(&["A", "B"])]);
        assert!(matches!(snapshot.next_hop("B", "A"), Err(Error::NoRoute { .. })));
    }

    #[test]
    fn router_absent_from_its_own_entry_is_no_route() {
        let broken = PathEntry {
            source: "A".to_string(),
            destination: "C".to_string(),
            path: vec!["B".to_string(), "C".to_string()],
        };
        let snapshot = RoutingSnapshot::new(1, vec![broken]);
        assert!(matches!(snapshot.next_hop("A", "C"), Err(Error::NoRoute { .. })));
    }

    #[test]
    fn messages_are_tagged_json() {
        let message = ControlMessage::RegisterClient { port: 5001 };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"type":"register_client","payload":{"port":5001}}"#);

        let probe = serde_json::to_string(&ControlMessage::Probe).unwrap();
        assert_eq!(probe, r#"{"type":"probe"}"#);
    }

    #[test]
    fn field_values_may_contain_any_character() {
        let message = DataMessage::text(5001, "node-1", 5002, "node-3", "a-b-c\n|:");
        let json = serde_json::to_vec(&ControlMessage::Data(message.clone())).unwrap();
        let back: ControlMessage = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, ControlMessage::Data(message));
    }
}
