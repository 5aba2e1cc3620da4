//! # Image Correlator
//!
//! Pairs an image trigger received over TCP with the two files the station deposits through
//! the imagery channel.
//!
//! The two channels race: the trigger usually arrives before the files are fully written.
//! Each trigger therefore starts a new capture *generation* and schedules a read after a
//! fixed delay. The read runs as its own task and reports back through a channel; outcomes
//! from an older generation are discarded when applied.
//!
//! ```text
//! on_trigger ──▶ generation += 1 ──▶ spawn(sleep(delay); read .jpg + .svg) ──▶ outcome_tx
//!                                                                               │
//! controller loop ◀──────────────────────────────────────────── outcome_rx ◀────┘
//!        └──▶ apply(outcome)   (ignored unless outcome.generation == generation)
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::overlay::annotate_overlay;
use super::types::{Artifact, CorrelationKey, ImageArtifactPair};
use crate::error_handling::types::CorrelationError;
use crate::network::types::ImageTrigger;
use crate::session_management::session::CodeEntry;

/// Default wait between an image trigger and reading its artifacts.
pub const DEFAULT_READ_DELAY: Duration = Duration::from_millis(1000);

const LARGE_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

/// Where deposited artifacts are read from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn read(&self, name: &str) -> Result<Vec<u8>, CorrelationError>;
}

/// Reads artifacts from the imagery root directory.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSource {
    root: PathBuf,
}

impl DirectoryArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Accepts only a single, non-hidden path component.
fn check_artifact_name(name: &str) -> Result<(), CorrelationError> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || name.starts_with('.') || name.contains('\\') {
        return Err(CorrelationError::InvalidKey(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ArtifactSource for DirectoryArtifactSource {
    async fn read(&self, name: &str) -> Result<Vec<u8>, CorrelationError> {
        check_artifact_name(name)?;
        let path = self.root.join(name);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| CorrelationError::ArtifactMissing {
                name: name.to_string(),
                source,
            })?;
        if data.len() > LARGE_ARTIFACT_BYTES {
            warn!(
                "large artifact {} ({:.2} MB)",
                path.display(),
                data.len() as f64 / 1024.0 / 1024.0
            );
        }
        Ok(data)
    }
}

/// Result of one deferred read, tagged with the generation that scheduled it.
#[derive(Debug)]
pub struct CorrelationOutcome {
    pub generation: u64,
    pub key: CorrelationKey,
    pub raster: Result<Artifact, CorrelationError>,
    pub vector: Result<Artifact, CorrelationError>,
}

/// Loads both artifacts of `key` concurrently; the vector one is annotated with `codes`.
pub async fn load_pair(
    source: &dyn ArtifactSource,
    generation: u64,
    key: CorrelationKey,
    codes: &[CodeEntry],
) -> CorrelationOutcome {
    let raster_name = key.raster_file();
    let vector_name = key.vector_file();
    let (raster, vector) = tokio::join!(source.read(&raster_name), source.read(&vector_name));

    let raster = raster.map(|data| Artifact::new(raster_name, data));
    let vector = vector.map(|data| {
        let annotated = annotate_overlay(&String::from_utf8_lossy(&data), codes);
        Artifact::new(vector_name, annotated.into_bytes())
    });
    CorrelationOutcome {
        generation,
        key,
        raster,
        vector,
    }
}

/// Holds the current artifact pair and the pending deferred read.
///
/// # Fields Overview
///
/// - `generation`: bumped on every capture start; only outcomes of the latest one apply
/// - `pair`: artifacts of the current capture, filled once the read completes
/// - `pending`: the scheduled read task, aborted when superseded
pub struct ImageCorrelator {
    source: Arc<dyn ArtifactSource>,
    read_delay: Duration,
    generation: u64,
    pair: Option<ImageArtifactPair>,
    pending: Option<JoinHandle<()>>,
    outcome_tx: UnboundedSender<CorrelationOutcome>,
}

impl ImageCorrelator {
    /// Creates the correlator and the receiver its read tasks report to.
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        read_delay: Duration,
    ) -> (Self, UnboundedReceiver<CorrelationOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let correlator = Self {
            source,
            read_delay,
            generation: 0,
            pair: None,
            pending: None,
            outcome_tx,
        };
        (correlator, outcome_rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a new capture: the previous pair and its pending read are dropped.
    pub fn begin_capture(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(pair) = self.pair.take() {
            debug!("discarding artifacts of {}", pair.key);
        }
    }

    /// Handles an image trigger and schedules the deferred artifact read.
    pub fn on_trigger(&mut self, trigger: &ImageTrigger, codes: Vec<CodeEntry>) -> CorrelationKey {
        self.begin_capture();
        let key = CorrelationKey::from_trigger(trigger);
        self.pair = Some(ImageArtifactPair::new(key.clone()));

        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let delay = self.read_delay;
        let tx = self.outcome_tx.clone();
        let task_key = key.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = load_pair(source.as_ref(), generation, task_key, &codes).await;
            let _ = tx.send(outcome);
        }));

        info!("image trigger {} (generation {})", key, generation);
        key
    }

    /// Installs a completed read. Returns `false` for outcomes of a superseded capture.
    pub fn apply(&mut self, outcome: CorrelationOutcome) -> bool {
        if outcome.generation != self.generation {
            debug!(
                "stale artifacts for {} (generation {} < {})",
                outcome.key, outcome.generation, self.generation
            );
            return false;
        }
        let Some(pair) = self.pair.as_mut().filter(|pair| pair.key == outcome.key) else {
            debug!("no pending capture for {}", outcome.key);
            return false;
        };
        self.pending = None;

        match outcome.raster {
            Ok(artifact) => pair.raster = Some(artifact),
            Err(e) => warn!("{}", e),
        }
        match outcome.vector {
            Ok(artifact) => pair.vector = Some(artifact),
            Err(e) => warn!("{}", e),
        }
        info!(
            "artifacts for {} loaded (complete: {})",
            pair.key,
            pair.is_complete()
        );
        true
    }

    pub fn current_pair(&self) -> Option<&ImageArtifactPair> {
        self.pair.as_ref()
    }

    /// Takes the current pair out, leaving nothing behind; any pending read is dropped too.
    pub fn take_pair(&mut self) -> Option<ImageArtifactPair> {
        let pair = self.pair.take();
        self.begin_capture();
        pair
    }
}

impl Drop for ImageCorrelator {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
