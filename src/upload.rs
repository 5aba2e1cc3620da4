//! Upload core module.
//!
//! This module turns the latest scan event and its artifact pair into an upload bundle and
//! delivers it to the warehouse, the durable log and object storage.

/// Submodule for the bundle, per-sink results and the log record.
pub mod bundle;
/// Submodule for the fan-out dispatch.
pub mod orchestrator;
/// Submodule for the sink traits and their HTTP implementations.
pub mod sinks;

pub use bundle::{BundleMetrics, LogRecord, SinkKind, UploadBundle, UploadReport, UploadResult};
pub use orchestrator::{Sinks, UploadOrchestrator};
pub use sinks::{HttpLogStore, HttpObjectStore, HttpWarehouse, LogSink, ObjectStore, WarehouseSink};
