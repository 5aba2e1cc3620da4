use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session_management::session::CodeEntry;

/// Lifecycle status of a scanner connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Registry record of one scanner connection.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub id: Uuid,
    pub host: String,
    pub port: u16,
    pub status: ConnectionStatus,
    pub last_connected: Option<DateTime<Utc>>,
    pub message_count: u64,
}

impl Connection {
    pub(crate) fn new(id: Uuid, host: &str, port: u16) -> Self {
        Self {
            id,
            host: host.to_string(),
            port,
            status: ConnectionStatus::Connecting,
            last_connected: None,
            message_count: 0,
        }
    }
}

/// Image trigger facet of a scan document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTrigger {
    pub name: String,
    pub index: u64,
}

/// Both facets of one decoded scan document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedScan {
    pub codes: Vec<CodeEntry>,
    pub image: Option<ImageTrigger>,
}

/// A unit produced by the stream decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanFrame {
    Scan(DecodedScan),
    Disconnected,
}

/// Event delivered to registry subscribers, in socket read order per connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Scan {
        connection_id: Uuid,
        scan: DecodedScan,
        received_at: DateTime<Utc>,
    },
    Disconnected {
        connection_id: Uuid,
    },
}

impl ConnectionEvent {
    pub fn connection_id(&self) -> Uuid {
        match self {
            ConnectionEvent::Scan { connection_id, .. } => *connection_id,
            ConnectionEvent::Disconnected { connection_id } => *connection_id,
        }
    }
}
