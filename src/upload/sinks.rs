//! # Upload Sinks
//!
//! Traits for the three kinds of fan-out destination and their HTTP implementations.
//!
//! - [`WarehouseSink`]: forwards the scanned barcodes to the warehouse system
//! - [`LogSink`]: persists one [`LogRecord`] per send in the durable log
//! - [`ObjectStore`]: stores the raster and vector artifacts in buckets
//!
//! Every call resolves to `Result<(), SinkError>`; retrying is left to the operator.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::bundle::LogRecord;
use crate::error_handling::types::SinkError;

#[async_trait]
pub trait WarehouseSink: Send + Sync {
    async fn forward(&self, barcodes: &[String]) -> Result<(), SinkError>;
}

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn persist(&self, record: &LogRecord) -> Result<(), SinkError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), SinkError>;
}

/// Builds the HTTP client shared by all sinks.
pub fn build_client(timeout: Duration) -> Result<Client, SinkError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn authorize(builder: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(key) => builder.header("apikey", key).bearer_auth(key),
        None => builder,
    }
}

/// Turns a non-2xx response into `SinkError::Status`, using the body as message.
async fn rejection(response: Response, fallback: &str) -> SinkError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        fallback.to_string()
    } else {
        body
    };
    SinkError::Status { status, message }
}

#[derive(Serialize)]
struct WarehouseRequest<'a> {
    barcodes: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct WarehouseReply {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Warehouse endpoint accepting `{"barcodes": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpWarehouse {
    client: Client,
    endpoint: String,
}

impl HttpWarehouse {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl WarehouseSink for HttpWarehouse {
    async fn forward(&self, barcodes: &[String]) -> Result<(), SinkError> {
        if barcodes.is_empty() {
            return Err(SinkError::EmptyBarcodes);
        }
        debug!("forwarding {} barcodes to {}", barcodes.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&WarehouseRequest { barcodes })
            .send()
            .await?;

        let status = response.status();
        let reply: Option<WarehouseReply> = response.json().await.ok();
        if !status.is_success() {
            let message = reply
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
            return Err(SinkError::Status {
                status: status.as_u16(),
                message,
            });
        }
        match reply {
            Some(WarehouseReply { status: true, .. }) => Ok(()),
            Some(WarehouseReply { error, .. }) => Err(SinkError::Rejected(
                error.unwrap_or_else(|| "Unknown error".to_string()),
            )),
            None => Err(SinkError::Rejected("Unknown error".to_string())),
        }
    }
}

/// Durable log table behind a REST endpoint; rows are posted as a JSON array.
#[derive(Debug, Clone)]
pub struct HttpLogStore {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLogStore {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LogSink for HttpLogStore {
    async fn persist(&self, record: &LogRecord) -> Result<(), SinkError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("Prefer", "return=representation")
            .json(&[record]);
        let response = authorize(request, self.api_key.as_deref()).send().await?;
        if !response.status().is_success() {
            let err = rejection(response, "Upload failed").await;
            warn!("log store rejected record for {}: {}", record.image_name, err);
            return Err(err);
        }
        Ok(())
    }
}

/// Bucketed object storage: `PUT <base>/object/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), SinkError> {
        let url = self.object_url(bucket, path);
        debug!("uploading {} bytes to {}", body.len(), url);
        let request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(body);
        let response = authorize(request, self.api_key.as_deref()).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response, "Upload failed").await);
        }
        Ok(())
    }
}
