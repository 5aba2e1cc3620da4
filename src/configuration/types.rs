use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session_management::session_log::DEFAULT_CAPACITY;

/// A saved scanner station the operator can connect to by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Connect to this host at startup when it is the selected one.
    #[serde(default)]
    pub auto_connect: bool,
}

/// `[scanner]` section.
///
/// # Fields Overview
///
/// - `connect_timeout_secs`: upper bound on a single connect attempt
/// - `capture_command`: text sent to the station to take a photo
/// - `hosts`: saved stations
/// - `selected_host`: id of the station used by default
/// - `regimes`: expected item counts offered to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_capture_command")]
    pub capture_command: String,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
    #[serde(default)]
    pub selected_host: Option<String>,
    #[serde(default)]
    pub regimes: Vec<u32>,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_capture_command() -> String {
    "||>trigger on".to_string()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            capture_command: default_capture_command(),
            hosts: Vec::new(),
            selected_host: None,
            regimes: Vec::new(),
        }
    }
}

impl ScannerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn host(&self, id: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|entry| entry.id == id)
    }

    pub fn selected(&self) -> Option<&HostEntry> {
        self.selected_host.as_deref().and_then(|id| self.host(id))
    }

    /// Regime presets in configured order, without duplicates.
    pub fn regime_presets(&self) -> Vec<u32> {
        let mut presets = Vec::with_capacity(self.regimes.len());
        for regime in &self.regimes {
            if !presets.contains(regime) {
                presets.push(*regime);
            }
        }
        presets
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Wait between an image trigger and reading its artifacts.
    #[serde(default = "default_artifact_read_delay_ms")]
    pub artifact_read_delay_ms: u64,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_artifact_read_delay_ms() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            artifact_read_delay_ms: default_artifact_read_delay_ms(),
        }
    }
}

impl SessionConfig {
    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.artifact_read_delay_ms)
    }
}

/// `[imagery]` section: the directory the station deposits its files into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageryConfig {
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,
}

fn default_root_path() -> PathBuf {
    PathBuf::from("ftp-root")
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_endpoint")]
    pub endpoint: String,
}

fn default_warehouse_endpoint() -> String {
    "http://127.0.0.1:8081/inbound".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: default_warehouse_endpoint(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStoreConfig {
    #[serde(default = "default_log_store_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_log_store_endpoint() -> String {
    "http://127.0.0.1:54321/rest/v1/logs".to_string()
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_log_store_endpoint(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    #[serde(default = "default_object_storage_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_raster_bucket")]
    pub raster_bucket: String,
    #[serde(default = "default_vector_bucket")]
    pub vector_bucket: String,
}

fn default_object_storage_endpoint() -> String {
    "http://127.0.0.1:54321/storage/v1".to_string()
}

fn default_raster_bucket() -> String {
    "images".to_string()
}

fn default_vector_bucket() -> String {
    "svg".to_string()
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_object_storage_endpoint(),
            api_key: None,
            raster_bucket: default_raster_bucket(),
            vector_bucket: default_vector_bucket(),
        }
    }
}

/// `[sinks]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default = "default_sink_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub log_store: LogStoreConfig,
    #[serde(default)]
    pub object_storage: ObjectStorageConfig,
}

fn default_sink_timeout_secs() -> u64 {
    30
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_sink_timeout_secs(),
            warehouse: WarehouseConfig::default(),
            log_store: LogStoreConfig::default(),
            object_storage: ObjectStorageConfig::default(),
        }
    }
}

impl SinksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Every configured endpoint, labelled for error messages.
    pub fn endpoints(&self) -> [(&'static str, &str); 3] {
        [
            ("warehouse", self.warehouse.endpoint.as_str()),
            ("log_store", self.log_store.endpoint.as_str()),
            ("object_storage", self.object_storage.endpoint.as_str()),
        ]
    }
}

/// `[api]` section: the operator control API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}
