//! Image correlation core module.
//!
//! This module reconciles image triggers from the scanner with the raster and vector files
//! deposited through the imagery channel, and prepares the overlay shown to the operator.

/// Submodule for the deferred artifact read and generation tracking.
pub mod correlator;
/// Submodule for vector overlay post-processing.
pub mod overlay;
/// Submodule for correlation keys and artifacts.
pub mod types;

pub use correlator::{
    ArtifactSource, CorrelationOutcome, DirectoryArtifactSource, ImageCorrelator,
    DEFAULT_READ_DELAY,
};
pub use overlay::{annotate_overlay, BoundingBox};
pub use types::{Artifact, CorrelationKey, ImageArtifactPair};
