// Controller module root
pub mod controller_handler;
pub mod types;

pub use controller_handler::{delivery_succeeded, Controller, ControllerHandle, ScanSession};
pub use types::{ConnectTarget, ImageView, OperatorCommand, StatusView, UploadOutcome};
