//! # Upload Orchestrator
//!
//! Assembles an [`UploadBundle`] from the session and the current artifact pair, then fans
//! it out to the four sinks concurrently.
//!
//! ```text
//!                       ┌──▶ warehouse.forward(barcodes)
//! prepare_bundle ──▶ dispatch ──▶ log.persist(record)          ──▶ UploadReport
//!                       ├──▶ objects.put(raster bucket, .jpg)      (one result per sink)
//!                       └──▶ objects.put(vector bucket, .svg)
//! ```
//!
//! A failing sink never cancels the others. Deciding whether a report counts as delivered
//! is up to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::task::JoinError;

use super::bundle::{SinkKind, UploadBundle, UploadReport, UploadResult};
use super::sinks::{
    build_client, HttpLogStore, HttpObjectStore, HttpWarehouse, LogSink, ObjectStore,
    WarehouseSink,
};
use crate::configuration::types::SinksConfig;
use crate::error_handling::types::{CorrelationError, SinkError};
use crate::image_correlation::correlator::ImageCorrelator;
use crate::session_management::session_store::SessionStore;

/// Handles to the fan-out destinations.
#[derive(Clone)]
pub struct Sinks {
    pub warehouse: Arc<dyn WarehouseSink>,
    pub log: Arc<dyn LogSink>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Sinks {
    /// HTTP sinks sharing one client.
    pub fn http(config: &SinksConfig) -> Result<Self, SinkError> {
        let client = build_client(config.timeout())?;
        Ok(Self {
            warehouse: Arc::new(HttpWarehouse::new(
                client.clone(),
                config.warehouse.endpoint.clone(),
            )),
            log: Arc::new(HttpLogStore::new(
                client.clone(),
                config.log_store.endpoint.clone(),
                config.log_store.api_key.clone(),
            )),
            objects: Arc::new(HttpObjectStore::new(
                client,
                config.object_storage.endpoint.clone(),
                config.object_storage.api_key.clone(),
            )),
        })
    }
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    sinks: Sinks,
    raster_bucket: String,
    vector_bucket: String,
}

impl UploadOrchestrator {
    pub fn new(
        sinks: Sinks,
        raster_bucket: impl Into<String>,
        vector_bucket: impl Into<String>,
    ) -> Self {
        Self {
            sinks,
            raster_bucket: raster_bucket.into(),
            vector_bucket: vector_bucket.into(),
        }
    }

    pub fn with_config(sinks: Sinks, config: &SinksConfig) -> Self {
        Self::new(
            sinks,
            config.object_storage.raster_bucket.clone(),
            config.object_storage.vector_bucket.clone(),
        )
    }

    /// Builds the bundle for the latest event and the current pair.
    ///
    /// The pair is taken out of the correlator before anything is checked, so it is gone
    /// whether or not this succeeds.
    ///
    /// # Errors
    ///
    /// * `CorrelationError::NoCapture` if no capture is pending
    /// * `CorrelationError::Incomplete` if either artifact failed to load
    /// * `CorrelationError::NoScanEvent` if the session log is empty
    /// * `CorrelationError::KeyMismatch` if the latest event was not the one that triggered
    ///   the pair
    pub fn prepare_bundle(
        store: &mut SessionStore,
        correlator: &mut ImageCorrelator,
        now: DateTime<Utc>,
    ) -> Result<UploadBundle, CorrelationError> {
        let pair = correlator.take_pair().ok_or(CorrelationError::NoCapture)?;
        let (key, raster, vector) = pair.into_complete()?;
        let latest = store.latest().ok_or(CorrelationError::NoScanEvent)?;
        if latest.image_key() != Some(&key) {
            return Err(CorrelationError::KeyMismatch {
                event: latest.image_key().map(|k| k.to_string()),
                pair: key.to_string(),
            });
        }
        let event = store
            .mark_sent(now)
            .ok_or(CorrelationError::NoScanEvent)?
            .clone();
        Ok(UploadBundle::new(event, key, raster, vector))
    }

    /// Sends the bundle to every sink at once and waits for all of them.
    pub async fn dispatch(&self, bundle: UploadBundle) -> UploadReport {
        info!(
            "dispatching {} ({} codes, {} added)",
            bundle.key, bundle.metrics.total_count, bundle.metrics.added_count
        );
        let bundle = Arc::new(bundle);

        let warehouse = {
            let sink = Arc::clone(&self.sinks.warehouse);
            let bundle = Arc::clone(&bundle);
            tokio::spawn(async move { sink.forward(&bundle.barcodes()).await })
        };
        let log = {
            let sink = Arc::clone(&self.sinks.log);
            let bundle = Arc::clone(&bundle);
            tokio::spawn(async move { sink.persist(&bundle.log_record()).await })
        };
        let raster = {
            let store = Arc::clone(&self.sinks.objects);
            let bucket = self.raster_bucket.clone();
            let bundle = Arc::clone(&bundle);
            tokio::spawn(async move {
                let artifact = &bundle.raster;
                store
                    .put_object(
                        &bucket,
                        &artifact.name,
                        &artifact.content_type,
                        artifact.data.clone(),
                    )
                    .await
            })
        };
        let vector = {
            let store = Arc::clone(&self.sinks.objects);
            let bucket = self.vector_bucket.clone();
            let bundle = Arc::clone(&bundle);
            tokio::spawn(async move {
                let artifact = &bundle.vector;
                store
                    .put_object(
                        &bucket,
                        &artifact.name,
                        &artifact.content_type,
                        artifact.data.clone(),
                    )
                    .await
            })
        };

        let (warehouse, log, raster, vector) = tokio::join!(warehouse, log, raster, vector);
        let report = UploadReport {
            results: vec![
                collect(SinkKind::Warehouse, warehouse),
                collect(SinkKind::LogStore, log),
                collect(SinkKind::RasterUpload, raster),
                collect(SinkKind::VectorUpload, vector),
            ],
        };
        info!("{} dispatched; all sinks ok: {}", bundle.key, report.all_succeeded());
        report
    }

    /// Prepares and dispatches in one step.
    pub async fn run(
        &self,
        store: &mut SessionStore,
        correlator: &mut ImageCorrelator,
    ) -> Result<UploadReport, CorrelationError> {
        let bundle = Self::prepare_bundle(store, correlator, Utc::now())?;
        Ok(self.dispatch(bundle).await)
    }
}

fn collect(sink: SinkKind, joined: Result<Result<(), SinkError>, JoinError>) -> UploadResult {
    let outcome = joined.unwrap_or_else(|e| Err(SinkError::TaskFailed(e.to_string())));
    if let Err(e) = &outcome {
        warn!("{} failed: {}", sink, e);
    }
    UploadResult::from_outcome(sink, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_correlation::correlator::{ArtifactSource, CorrelationOutcome};
    use crate::image_correlation::types::Artifact;
    use crate::network::types::{DecodedScan, ImageTrigger};
    use crate::session_management::session::CodeEntry;
    use crate::upload::bundle::LogRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        barcodes: Mutex<Vec<Vec<String>>>,
        records: Mutex<Vec<LogRecord>>,
        objects: Mutex<Vec<(String, String, String)>>,
        failing_bucket: Option<&'static str>,
        panic_in_warehouse: bool,
    }

    #[async_trait]
    impl WarehouseSink for Recorder {
        async fn forward(&self, barcodes: &[String]) -> Result<(), SinkError> {
            if self.panic_in_warehouse {
                panic!("warehouse client crashed");
            }
            self.barcodes.lock().unwrap().push(barcodes.to_vec());
            Ok(())
        }
    }

    #[async_trait]
    impl LogSink for Recorder {
        async fn persist(&self, record: &LogRecord) -> Result<(), SinkError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl ObjectStore for Recorder {
        async fn put_object(
            &self,
            bucket: &str,
            path: &str,
            content_type: &str,
            _body: Vec<u8>,
        ) -> Result<(), SinkError> {
            if self.failing_bucket == Some(bucket) {
                return Err(SinkError::Status {
                    status: 500,
                    message: "bucket offline".into(),
                });
            }
            self.objects.lock().unwrap().push((
                bucket.to_string(),
                path.to_string(),
                content_type.to_string(),
            ));
            Ok(())
        }
    }

    struct NoArtifacts;

    #[async_trait]
    impl ArtifactSource for NoArtifacts {
        async fn read(&self, name: &str) -> Result<Vec<u8>, CorrelationError> {
            Err(CorrelationError::InvalidKey(name.to_string()))
        }
    }

    fn orchestrator(recorder: Arc<Recorder>) -> UploadOrchestrator {
        let sinks = Sinks {
            warehouse: recorder.clone(),
            log: recorder.clone(),
            objects: recorder,
        };
        UploadOrchestrator::new(sinks, "images", "svg")
    }

    /// Session with one scanned event and a correlator holding its pair.
    fn captured(complete: bool) -> (SessionStore, ImageCorrelator) {
        let mut store = SessionStore::new(10);
        store.set_regime(Some(3));
        let trigger = ImageTrigger {
            name: "cam".into(),
            index: 5,
        };
        let codes = vec![
            CodeEntry::scanned("A1", None),
            CodeEntry::scanned("B2", None),
        ];
        store.append_event(
            Uuid::new_v4(),
            DecodedScan {
                codes: codes.clone(),
                image: Some(trigger.clone()),
            },
            Utc::now(),
        );
        store.add_manual_entry("C3");

        let (mut correlator, _rx) =
            ImageCorrelator::new(Arc::new(NoArtifacts), Duration::from_secs(60));
        let key = correlator.on_trigger(&trigger, codes);
        let vector = if complete {
            Ok(Artifact::new("cam-5.svg", b"<svg></svg>".to_vec()))
        } else {
            Err(CorrelationError::InvalidKey("cam-5.svg".into()))
        };
        correlator.apply(CorrelationOutcome {
            generation: correlator.generation(),
            key,
            raster: Ok(Artifact::new("cam-5.jpg", vec![0xff, 0xd8])),
            vector,
        });
        (store, correlator)
    }

    #[tokio::test]
    async fn raster_failure_does_not_affect_other_sinks() {
        let _ = env_logger::builder().is_test(true).try_init();
        let recorder = Arc::new(Recorder {
            failing_bucket: Some("images"),
            ..Default::default()
        });
        let (mut store, mut correlator) = captured(true);

        let report = orchestrator(recorder.clone())
            .run(&mut store, &mut correlator)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 4);
        assert!(report.succeeded(SinkKind::Warehouse));
        assert!(report.succeeded(SinkKind::LogStore));
        assert!(!report.succeeded(SinkKind::RasterUpload));
        assert!(report.succeeded(SinkKind::VectorUpload));
        assert_eq!(
            report.get(SinkKind::RasterUpload).unwrap().error.as_deref(),
            Some("bucket offline")
        );
        assert!(correlator.current_pair().is_none());

        assert_eq!(
            recorder.barcodes.lock().unwrap()[0],
            vec!["A1".to_string(), "B2".to_string(), "C3".to_string()]
        );
        let objects = recorder.objects.lock().unwrap().clone();
        assert_eq!(
            objects,
            vec![(
                "svg".to_string(),
                "cam-5.svg".to_string(),
                "image/svg+xml".to_string()
            )]
        );
        let record = recorder.records.lock().unwrap()[0].clone();
        assert_eq!(record.image_name, "cam-5");
        assert_eq!(record.regime, Some(3));
        assert_eq!(record.total_count, 3);
        assert_eq!(record.added_count, 1);
        assert!(record.sent_at.is_some());
        assert!(store.latest().unwrap().sent_at().is_some());
    }

    #[tokio::test]
    async fn panicking_sink_becomes_failed_result() {
        let recorder = Arc::new(Recorder {
            panic_in_warehouse: true,
            ..Default::default()
        });
        let (mut store, mut correlator) = captured(true);
        let report = orchestrator(recorder)
            .run(&mut store, &mut correlator)
            .await
            .unwrap();

        let warehouse = report.get(SinkKind::Warehouse).unwrap();
        assert!(!warehouse.success);
        assert!(warehouse
            .error
            .as_deref()
            .unwrap()
            .starts_with("sink task failed"));
        assert!(report.succeeded(SinkKind::LogStore));
        assert!(report.succeeded(SinkKind::RasterUpload));
        assert!(report.succeeded(SinkKind::VectorUpload));
    }

    #[tokio::test]
    async fn incomplete_pair_dispatches_nothing_and_is_cleared() {
        let recorder = Arc::new(Recorder::default());
        let (mut store, mut correlator) = captured(false);

        let err = orchestrator(recorder.clone())
            .run(&mut store, &mut correlator)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CorrelationError::Incomplete {
                raster: true,
                vector: false,
                ..
            }
        ));
        assert!(correlator.current_pair().is_none());
        assert!(recorder.barcodes.lock().unwrap().is_empty());
        assert!(recorder.objects.lock().unwrap().is_empty());
        assert!(store.latest().unwrap().sent_at().is_none());
    }

    #[tokio::test]
    async fn no_capture_and_no_event_fail_fast() {
        let (mut correlator, _rx) =
            ImageCorrelator::new(Arc::new(NoArtifacts), Duration::from_secs(60));
        let mut store = SessionStore::new(10);
        let err = UploadOrchestrator::prepare_bundle(&mut store, &mut correlator, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CorrelationError::NoCapture));

        let (_, mut correlator) = captured(true);
        let err = UploadOrchestrator::prepare_bundle(&mut store, &mut correlator, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CorrelationError::NoScanEvent));
        assert!(correlator.current_pair().is_none());
    }

    #[tokio::test]
    async fn later_event_is_not_bundled_with_the_pair() {
        let recorder = Arc::new(Recorder::default());
        let (mut store, mut correlator) = captured(true);
        store.record_lifecycle(Uuid::new_v4(), "Disconnected");

        let err = orchestrator(recorder.clone())
            .run(&mut store, &mut correlator)
            .await
            .unwrap_err();
        match err {
            CorrelationError::KeyMismatch { event, pair } => {
                assert_eq!(event, None);
                assert_eq!(pair, "cam-5");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(correlator.current_pair().is_none());
        assert!(recorder.barcodes.lock().unwrap().is_empty());
        assert!(recorder.records.lock().unwrap().is_empty());
        assert!(store.events().all(|event| event.sent_at().is_none()));
    }
}
