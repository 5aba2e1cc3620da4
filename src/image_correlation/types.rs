//! Correlation keys and the artifacts paired with one capture.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error_handling::types::CorrelationError;
use crate::network::types::ImageTrigger;

const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

/// Base name of the two files deposited for one capture: `<name>-<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn from_trigger(trigger: &ImageTrigger) -> Self {
        Self(format!("{}-{}", trigger.name, trigger.index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the photo deposited over the imagery channel.
    pub fn raster_file(&self) -> String {
        format!("{}.jpg", self.0)
    }

    /// File name of the overlay deposited over the imagery channel.
    pub fn vector_file(&self) -> String {
        format!("{}.svg", self.0)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loaded artifact, ready for display or upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_raw()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        Self {
            name,
            content_type,
            data,
        }
    }

    /// Transfer-ready base64 encoding of the artifact bytes.
    pub fn payload(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.payload())
    }
}

/// The raster photo and annotated vector overlay of one capture.
#[derive(Debug, Clone)]
pub struct ImageArtifactPair {
    pub key: CorrelationKey,
    pub raster: Option<Artifact>,
    pub vector: Option<Artifact>,
}

impl ImageArtifactPair {
    pub fn new(key: CorrelationKey) -> Self {
        Self {
            key,
            raster: None,
            vector: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.raster.is_some() && self.vector.is_some()
    }

    /// Splits a fully loaded pair into its parts, or reports which half is missing.
    pub fn into_complete(self) -> Result<(CorrelationKey, Artifact, Artifact), CorrelationError> {
        match (self.raster, self.vector) {
            (Some(raster), Some(vector)) => Ok((self.key, raster, vector)),
            (raster, vector) => Err(CorrelationError::Incomplete {
                key: self.key.to_string(),
                raster: raster.is_some(),
                vector: vector.is_some(),
            }),
        }
    }
}
