//! Error taxonomy shared by every subsystem.

pub mod types;

pub use types::{
    ConfigError, ConnectionError, ControllerError, CorrelationError, ProtocolError, SinkError,
};
