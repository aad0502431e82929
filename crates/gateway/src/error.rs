//! Error-to-response mapping for the HTTP surface.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// The bridge is up but the platform session is not.
    Unavailable(String),
    /// The platform rejected the operation.
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<hermod_webhooks::Error> for ApiError {
    fn from(error: hermod_webhooks::Error) -> Self {
        match error {
            hermod_webhooks::Error::Validation(message) => Self::BadRequest(message),
            hermod_webhooks::Error::Storage(hermod_storage::Error::ConfigNotFound { id }) => {
                Self::NotFound(format!("webhook config not found: {id}"))
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<hermod_storage::Error> for ApiError {
    fn from(error: hermod_storage::Error) -> Self {
        match error {
            hermod_storage::Error::ConfigNotFound { id } => {
                Self::NotFound(format!("webhook config not found: {id}"))
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<hermod_platform::Error> for ApiError {
    fn from(error: hermod_platform::Error) -> Self {
        use hermod_platform::Error as Platform;
        match error {
            Platform::NotConnected => {
                Self::Unavailable("not connected to the platform".to_string())
            },
            Platform::Address(e) => Self::BadRequest(e.to_string()),
            Platform::MediaPath(e) => Self::BadRequest(e.to_string()),
            e @ Platform::MediaRead { .. } => Self::BadRequest(e.to_string()),
            e @ (Platform::PairingInProgress | Platform::AlreadyPaired) => {
                Self::Conflict(e.to_string())
            },
            e @ (Platform::PairingTimeout | Platform::PairingFailed { .. }) => {
                Self::Upstream(e.to_string())
            },
            other => Self::Upstream(other.to_string()),
        }
    }
}
