//! HTTP error responses.
//!
//! Every failure is returned as `{"error": {"code": ..., "message": ...}}`
//! with a status derived from the error category.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::ZeusError;

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Envelope the payload travels in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: ApiError,
}

/// Error returned from handlers.
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl RestError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new("VALIDATION_ERROR", message),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.error })).into_response()
    }
}

impl From<ZeusError> for RestError {
    fn from(err: ZeusError) -> Self {
        let (status, code) = match &err {
            ZeusError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ZeusError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ZeusError::Submission(_) => (StatusCode::BAD_GATEWAY, "SUBMISSION_FAILED"),
            ZeusError::Reconcile(_) => (StatusCode::BAD_GATEWAY, "RECONCILE_FAILED"),
            ZeusError::ResultsFetch(_) => (StatusCode::BAD_GATEWAY, "RESULTS_FETCH_FAILED"),
            ZeusError::ExportLocation(_) => (StatusCode::CONFLICT, "EXPORT_LOCATION_UNRESOLVED"),
            ZeusError::ExportFetch(_) => (StatusCode::BAD_GATEWAY, "EXPORT_FETCH_FAILED"),
            ZeusError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR"),
            ZeusError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            ZeusError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if err.is_retryable() {
            warn!("{}: {}", err.category(), err);
        } else if status.is_server_error() {
            error!("{}: {}", err.category(), err);
        }

        Self {
            status,
            error: ApiError::new(code, err.message()),
        }
    }
}

impl From<JsonRejection> for RestError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for RestError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
