// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;

// Re-export commonly used items
pub use routes::operator_routes;
pub use types::{status_for, ApiError, ConnectRequest};
pub use web_server::WebServer;
