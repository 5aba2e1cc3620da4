pub mod config;
pub mod types;

pub use config::{prepare_imagery_root, CommandLine, Config};
pub use types::{ApiConfig, HostEntry, ImageryConfig, ScannerConfig, SessionConfig, SinksConfig};
