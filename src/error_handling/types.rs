use std::io;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("TOML parsing error: {0}")]
    TomlError(String),
    #[error("Port range error: {0}")]
    BadPortsRange(String),
    #[error("Host entry error: {0}")]
    BadHostEntry(String),
    #[error("Unknown host entry: {0}")]
    UnknownHost(String),
    #[error("Directory error: {0}")]
    DirectoryNotWritable(String),
    #[error("Value out of range: {0}")]
    NotInRange(String),
    #[error("Endpoint error: {0}")]
    BadEndpoint(String),
}

/// Failures of the scanner TCP channel. Surfaced to the caller of connect/send, never retried.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection to {addr} refused: {source}")]
    Refused {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },
    #[error("connection {0} is not connected")]
    NotConnected(Uuid),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Malformed scanner data. Logged and dropped by the decoder, never propagated.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed scan document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("scan document carries neither codes nor an image trigger")]
    NoFacets,
    #[error("pending frame exceeds {0} bytes")]
    Oversized(usize),
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("artifact {name} could not be read: {source}")]
    ArtifactMissing {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("artifact name {0:?} is not a plain file name")]
    InvalidKey(String),
    #[error("image pair {key} is incomplete (raster loaded: {raster}, vector loaded: {vector})")]
    Incomplete {
        key: String,
        raster: bool,
        vector: bool,
    },
    #[error("no image capture is pending")]
    NoCapture,
    #[error("session log is empty")]
    NoScanEvent,
    #[error("latest scan event belongs to {event:?}, not to image pair {pair}")]
    KeyMismatch { event: Option<String>, pair: String },
}

/// One fan-out destination failed. Reported per sink, never thrown across the orchestrator.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("No barcodes provided")]
    EmptyBarcodes,
    #[error("sink task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),
    #[error("Connection error: {0}")]
    ConnectionError(#[from] ConnectionError),
    #[error("Correlation error: {0}")]
    CorrelationError(#[from] CorrelationError),
    #[error("Sink error: {0}")]
    SinkError(#[from] SinkError),
    #[error("controller channel closed")]
    ChannelClosed,
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}
