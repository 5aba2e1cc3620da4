//! Scanner network layer.
//!
//! [`decoder`] turns socket bytes into scan frames, [`connection_registry`] owns the TCP links
//! and publishes decoded events.

pub mod connection_registry;
pub mod decoder;
pub mod types;

pub use connection_registry::ConnectionRegistry;
pub use decoder::{decode_document, normalize_command, FrameDecoder};
pub use types::{Connection, ConnectionEvent, ConnectionStatus, DecodedScan, ImageTrigger, ScanFrame};
