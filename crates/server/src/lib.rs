//! Student Support Assistant Server
//!
//! HTTP endpoints for the dialogue engine, retrieval, classification,
//! email drafting and the contact directory.

pub mod client;
pub mod http;
pub mod metrics;
pub mod state;

pub use client::client_identifier;
pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Config(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<campus_assist_core::Error> for ServerError {
    fn from(err: campus_assist_core::Error) -> Self {
        use campus_assist_core::Error;
        match err {
            Error::InvalidRequest(msg) => ServerError::InvalidRequest(msg),
            Error::SessionNotFound(id) => ServerError::NotFound(format!("session {}", id)),
            Error::ProviderUnavailable(msg) | Error::CorpusUnavailable(msg) => {
                ServerError::Unavailable(msg)
            },
            Error::Config(msg) => ServerError::Config(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<campus_assist_config::ConfigError> for ServerError {
    fn from(err: campus_assist_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<campus_assist_rag::RagError> for ServerError {
    fn from(err: campus_assist_rag::RagError) -> Self {
        campus_assist_core::Error::from(err).into()
    }
}

impl From<campus_assist_llm::LlmError> for ServerError {
    fn from(err: campus_assist_llm::LlmError) -> Self {
        campus_assist_core::Error::from(err).into()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_assist_core::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::from(Error::InvalidRequest("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(Error::CorpusUnavailable("x".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::from(Error::SessionNotFound("s1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::from(Error::Storage("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
