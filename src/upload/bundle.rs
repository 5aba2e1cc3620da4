//! Upload bundle and per-sink results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error_handling::types::SinkError;
use crate::image_correlation::types::{Artifact, CorrelationKey};
use crate::session_management::session::{CodeEntry, ScanEvent};

/// The four fan-out destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Warehouse,
    LogStore,
    RasterUpload,
    VectorUpload,
}

impl SinkKind {
    pub const ALL: [SinkKind; 4] = [
        SinkKind::Warehouse,
        SinkKind::LogStore,
        SinkKind::RasterUpload,
        SinkKind::VectorUpload,
    ];
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkKind::Warehouse => "warehouse",
            SinkKind::LogStore => "log store",
            SinkKind::RasterUpload => "raster upload",
            SinkKind::VectorUpload => "vector upload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub sink: SinkKind,
    pub success: bool,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn from_outcome(sink: SinkKind, outcome: Result<(), SinkError>) -> Self {
        match outcome {
            Ok(()) => Self {
                sink,
                success: true,
                error: None,
            },
            Err(e) => Self {
                sink,
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Aggregated results of one fan-out, one entry per sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub results: Vec<UploadResult>,
}

impl UploadReport {
    pub fn get(&self, sink: SinkKind) -> Option<&UploadResult> {
        self.results.iter().find(|r| r.sink == sink)
    }

    pub fn succeeded(&self, sink: SinkKind) -> bool {
        self.get(sink).is_some_and(|r| r.success)
    }

    pub fn all_succeeded(&self) -> bool {
        SinkKind::ALL.iter().all(|sink| self.succeeded(*sink))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BundleMetrics {
    /// Whole seconds between receipt and send.
    pub duration_secs: Option<i64>,
    pub total_count: usize,
    pub added_count: usize,
}

/// Elapsed whole seconds from `received` to `sent`, when both are known.
pub fn elapsed_secs(received: Option<DateTime<Utc>>, sent: Option<DateTime<Utc>>) -> Option<i64> {
    Some((sent? - received?).num_seconds())
}

/// Everything one send dispatches. Built at send time, never persisted.
#[derive(Debug, Clone)]
pub struct UploadBundle {
    pub event: ScanEvent,
    pub key: CorrelationKey,
    pub raster: Artifact,
    pub vector: Artifact,
    pub metrics: BundleMetrics,
}

impl UploadBundle {
    pub fn new(event: ScanEvent, key: CorrelationKey, raster: Artifact, vector: Artifact) -> Self {
        let metrics = BundleMetrics {
            duration_secs: elapsed_secs(Some(event.received_at()), event.sent_at()),
            total_count: event.content().len(),
            added_count: event.added_count(),
        };
        Self {
            event,
            key,
            raster,
            vector,
            metrics,
        }
    }

    pub fn barcodes(&self) -> Vec<String> {
        self.event
            .content()
            .iter()
            .map(|code| code.content.clone())
            .collect()
    }

    pub fn log_record(&self) -> LogRecord {
        LogRecord {
            content: self.event.content().to_vec(),
            regime: self.event.regime(),
            received_at: self.event.received_at(),
            sent_at: self.event.sent_at(),
            duration_secs: self.metrics.duration_secs,
            total_count: self.metrics.total_count,
            added_count: self.metrics.added_count,
            image_name: self.key.to_string(),
        }
    }
}

/// Row written to the durable log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub content: Vec<CodeEntry>,
    pub regime: Option<u32>,
    pub received_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub total_count: usize,
    pub added_count: usize,
    pub image_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn elapsed_needs_both_ends() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(4_700);
        assert_eq!(elapsed_secs(Some(t0), Some(t1)), Some(4));
        assert_eq!(elapsed_secs(None, Some(t1)), None);
        assert_eq!(elapsed_secs(Some(t0), None), None);
    }

    #[test]
    fn report_lookup_by_sink() {
        let report = UploadReport {
            results: vec![
                UploadResult::from_outcome(SinkKind::Warehouse, Ok(())),
                UploadResult::from_outcome(SinkKind::LogStore, Err(SinkError::EmptyBarcodes)),
            ],
        };
        assert!(report.succeeded(SinkKind::Warehouse));
        assert!(!report.succeeded(SinkKind::LogStore));
        assert!(!report.succeeded(SinkKind::RasterUpload));
        assert_eq!(
            report.get(SinkKind::LogStore).unwrap().error.as_deref(),
            Some("No barcodes provided")
        );
        assert!(!report.all_succeeded());
    }

    #[test]
    fn log_record_uses_camel_case_keys() {
        let record = LogRecord {
            content: vec![CodeEntry::manual("X")],
            regime: Some(2),
            received_at: Utc::now(),
            sent_at: None,
            duration_secs: None,
            total_count: 1,
            added_count: 1,
            image_name: "cam-1".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["imageName"], "cam-1");
        assert_eq!(json["addedCount"], 1);
        assert_eq!(json["content"][0]["added_manually"], true);
    }
}
