use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::types::*;
use crate::error_handling::types::ConfigError;

/// Largest session log capacity accepted.
pub const MAX_CAPACITY: usize = 1000;

const WRITE_CHECK: &str = ".scanlink-write-check";

/// Command-line arguments of the `scanlink` binary.
///
/// Values given here take precedence over the configuration file.
#[derive(Parser, Debug, Clone)]
#[command(name = "scanlink")]
#[command(version)]
#[command(about = "Scan session correlation and upload engine for barcode scanning stations")]
pub struct CommandLine {
    /// Path to the TOML configuration file
    pub config_file: PathBuf,

    /// Port of the operator control API
    ///
    /// # Command Line
    /// Use `--api-port <PORT>` to override `[api].port`
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory the station deposits its images into
    ///
    /// # Command Line
    /// Use `--imagery-root <PATH>` or `SCANLINK_IMAGERY_ROOT` to override `[imagery].root_path`
    #[arg(long, env = "SCANLINK_IMAGERY_ROOT")]
    pub imagery_root: Option<PathBuf>,

    /// API key for the log store and object storage
    ///
    /// # Command Line
    /// Use `--sink-api-key <KEY>` or `SCANLINK_SINK_API_KEY`; it replaces both configured keys
    #[arg(long, env = "SCANLINK_SINK_API_KEY", hide_env_values = true)]
    pub sink_api_key: Option<String>,

    /// Do not start the operator control API
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_api: bool,
}

/// Application configuration loaded from a TOML file.
///
/// # Fields Overview
///
/// - `scanner`: saved stations, connect timeout, capture command and regime presets
/// - `session`: session log capacity and the artifact read delay
/// - `imagery`: root directory of the imagery channel
/// - `sinks`: endpoints and credentials of the upload destinations
/// - `api`: whether and where to serve the operator control API
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub imagery: ImageryConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Reads and parses a TOML configuration file. No validation happens here.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Loads the file named on the command line, applies overrides, validates, and makes
    /// sure the imagery root is usable.
    pub fn load(cli: &CommandLine) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&cli.config_file)?;
        config.apply_command_line(cli);
        config.validate()?;
        prepare_imagery_root(&config.imagery.root_path)?;
        info!(
            "configuration loaded: {} saved hosts, imagery root {}",
            config.scanner.hosts.len(),
            config.imagery.root_path.display()
        );
        Ok(config)
    }

    pub fn apply_command_line(&mut self, cli: &CommandLine) {
        if let Some(port) = cli.api_port {
            self.api.port = port;
        }
        if let Some(root) = &cli.imagery_root {
            self.imagery.root_path = root.clone();
        }
        if let Some(key) = &cli.sink_api_key {
            self.sinks.log_store.api_key = Some(key.clone());
            self.sinks.object_storage.api_key = Some(key.clone());
        }
        if cli.no_api {
            self.api.enabled = false;
        }
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for entry in &self.scanner.hosts {
            if entry.name.trim().is_empty() || entry.host.trim().is_empty() {
                return Err(ConfigError::BadHostEntry(format!(
                    "host {:?} needs both a name and an address",
                    entry.id
                )));
            }
            if entry.port == 0 {
                return Err(ConfigError::BadPortsRange(format!(
                    "host {:?} has port 0; expected 1-65535",
                    entry.id
                )));
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(ConfigError::BadHostEntry(format!(
                    "duplicate host id {:?}",
                    entry.id
                )));
            }
        }
        if let Some(selected) = &self.scanner.selected_host {
            if self.scanner.host(selected).is_none() {
                return Err(ConfigError::UnknownHost(selected.clone()));
            }
        }
        if self.scanner.connect_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "scanner.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_CAPACITY).contains(&self.session.capacity) {
            return Err(ConfigError::NotInRange(format!(
                "session.capacity is {}; expected 1-{}",
                self.session.capacity, MAX_CAPACITY
            )));
        }
        for (label, endpoint) in self.sinks.endpoints() {
            check_endpoint(label, endpoint)?;
        }
        if self.api.port == 0 {
            return Err(ConfigError::BadPortsRange(
                "api.port must be in 1-65535".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_endpoint(label: &str, endpoint: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| ConfigError::BadEndpoint(format!("{}: {:?}: {}", label, endpoint, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::BadEndpoint(format!(
            "{}: unsupported scheme {:?}",
            label, other
        ))),
    }
}

/// Creates the imagery root if missing and checks it can be read and written.
pub fn prepare_imagery_root(path: &Path) -> Result<(), ConfigError> {
    let not_writable =
        |e: std::io::Error| ConfigError::DirectoryNotWritable(format!("{}: {}", path.display(), e));

    if !path.exists() {
        info!("creating imagery root {}", path.display());
    }
    fs::create_dir_all(path).map_err(not_writable)?;
    fs::read_dir(path).map_err(not_writable)?;
    let marker = path.join(WRITE_CHECK);
    fs::write(&marker, b"").map_err(not_writable)?;
    fs::remove_file(&marker).map_err(not_writable)?;
    Ok(())
}
