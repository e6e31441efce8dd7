//! Chronoweave — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chronoweave_core::error::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Tracing subscriber or span exporter setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code and machine-readable code for the wrapped error.
    #[must_use]
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::MissingFields(_) => (StatusCode::BAD_REQUEST, "missing_fields"),
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            DomainError::RunNotFound(_) => (StatusCode::NOT_FOUND, "run_not_found"),
            DomainError::UnknownAction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_action"),
            DomainError::SessionAlreadyExists(_) => (StatusCode::CONFLICT, "session_already_exists"),
            DomainError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            DomainError::Generator(_) => (StatusCode::BAD_GATEWAY, "generator_error"),
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.classify();

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
