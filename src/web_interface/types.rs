use serde::{Deserialize, Serialize};
use warp::http::StatusCode;

use crate::controller::types::ConnectTarget;
use crate::error_handling::types::{
    ConfigError, ConnectionError, ControllerError, CorrelationError,
};

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Body of `POST /connect`: a saved host id or an explicit address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConnectRequest {
    Saved { host_id: String },
    Address { host: String, port: u16 },
}

impl From<ConnectRequest> for ConnectTarget {
    fn from(request: ConnectRequest) -> Self {
        match request {
            ConnectRequest::Saved { host_id } => ConnectTarget::Saved(host_id),
            ConnectRequest::Address { host, port } => ConnectTarget::Address { host, port },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub connection_id: uuid::Uuid,
}

/// Body of `POST /command` and `POST /entries`.
#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub text: String,
}

/// Body of `PUT /regime`. Anything that is not a non-negative integer unsets the regime.
#[derive(Debug, Clone, Deserialize)]
pub struct RegimeBody {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct RegimeResponse {
    pub regime: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub accepted: bool,
}

/// HTTP status an operator sees for a failed request.
pub fn status_for(error: &ControllerError) -> StatusCode {
    match error {
        ControllerError::ConfigurationError(ConfigError::UnknownHost(_)) => StatusCode::NOT_FOUND,
        ControllerError::ConfigurationError(_) => StatusCode::BAD_REQUEST,
        ControllerError::ConnectionError(ConnectionError::NotConnected(_)) => StatusCode::CONFLICT,
        ControllerError::ConnectionError(ConnectionError::Timeout { .. }) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        ControllerError::ConnectionError(_) => StatusCode::BAD_GATEWAY,
        ControllerError::CorrelationError(CorrelationError::InvalidKey(_)) => {
            StatusCode::BAD_REQUEST
        }
        ControllerError::CorrelationError(_) => StatusCode::CONFLICT,
        ControllerError::SinkError(_) => StatusCode::BAD_GATEWAY,
        ControllerError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
        ControllerError::InitializationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
