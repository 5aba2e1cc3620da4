use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error_handling::types::ControllerError;
use crate::image_correlation::types::{CorrelationKey, ImageArtifactPair};
use crate::network::types::Connection;
use crate::session_management::session::{classify, manual_entry_offered, Completeness, ScanEvent};
use crate::upload::bundle::UploadReport;

/// Which station to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A host saved in the configuration, by id.
    Saved(String),
    Address { host: String, port: u16 },
}

type Reply<T> = oneshot::Sender<Result<T, ControllerError>>;

/// Requests handled by the controller loop, each answered on its own oneshot channel.
#[derive(Debug)]
pub enum OperatorCommand {
    Status(oneshot::Sender<StatusView>),
    Image(oneshot::Sender<Option<ImageView>>),
    Connect { target: ConnectTarget, reply: Reply<Uuid> },
    Disconnect(oneshot::Sender<bool>),
    Send { text: String, reply: Reply<()> },
    Capture(Reply<()>),
    SetRegime { regime: Option<u32>, reply: oneshot::Sender<()> },
    AddEntry { text: String, reply: oneshot::Sender<bool> },
    Upload(Reply<UploadOutcome>),
    Shutdown,
}

/// A logged event as the operator sees it; completeness is computed on every read.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: ScanEvent,
    pub completeness: Completeness,
    pub manual_entry_offered: bool,
}

impl From<&ScanEvent> for EventView {
    fn from(event: &ScanEvent) -> Self {
        Self {
            event: event.clone(),
            completeness: classify(event),
            manual_entry_offered: manual_entry_offered(event),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub connections: Vec<Connection>,
    pub active_connection: Option<Uuid>,
    pub regime: Option<u32>,
    pub regime_presets: Vec<u32>,
    pub total_captures: u64,
    pub pending_capture: Option<CorrelationKey>,
    /// Oldest first.
    pub events: Vec<EventView>,
}

/// The current artifact pair, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageView {
    pub key: CorrelationKey,
    pub raster: Option<String>,
    pub vector: Option<String>,
    pub complete: bool,
}

impl From<&ImageArtifactPair> for ImageView {
    fn from(pair: &ImageArtifactPair) -> Self {
        Self {
            key: pair.key.clone(),
            raster: pair.raster.as_ref().map(|a| a.data_uri()),
            vector: pair.vector.as_ref().map(|a| a.data_uri()),
            complete: pair.is_complete(),
        }
    }
}

/// Fan-out report plus the verdict of the delivery policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub report: UploadReport,
    pub delivered: bool,
}
