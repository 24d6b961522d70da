pub mod analysis;
pub mod health;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{
    AnalysisClientError, DatabaseError, ProcessingError, ResyncError, SubmissionError,
};
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "payload_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(trace_id = %self.trace_id, error = %self.error, message = %self.message, "Request failed");
        }
        (status, Json(self)).into_response()
    }
}

impl From<DatabaseError> for ErrorResponse {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ErrorResponse::new("not_found", msg),
            e @ DatabaseError::ConcurrencyConflict { .. } => {
                ErrorResponse::new("conflict", e.to_string())
            }
            e => ErrorResponse::new("database_error", e.to_string()),
        }
    }
}

impl From<AnalysisClientError> for ErrorResponse {
    fn from(err: AnalysisClientError) -> Self {
        match err {
            e @ AnalysisClientError::ServiceUnavailable(_) => {
                ErrorResponse::new("service_unavailable", e.to_string())
            }
            e => ErrorResponse::new("bad_gateway", e.to_string()),
        }
    }
}

impl From<ProcessingError> for ErrorResponse {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Store(e) => e.into(),
            e @ ProcessingError::Malformed(_) => ErrorResponse::new("bad_gateway", e.to_string()),
            e @ ProcessingError::NoStoredResult(_) => {
                ErrorResponse::new("validation_error", e.to_string())
            }
        }
    }
}

impl From<SubmissionError> for ErrorResponse {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::InvalidUpload(msg) => ErrorResponse::new("validation_error", msg),
            SubmissionError::Upstream(e) => e.into(),
            SubmissionError::Store(e) => e.into(),
        }
    }
}

impl From<ResyncError> for ErrorResponse {
    fn from(err: ResyncError) -> Self {
        match err {
            e @ ResyncError::JobNotFound(_) => ErrorResponse::new("not_found", e.to_string()),
            e @ (ResyncError::InvalidState(_) | ResyncError::Transition(_)) => {
                ErrorResponse::new("validation_error", e.to_string())
            }
            ResyncError::Upstream(e) => e.into(),
            ResyncError::Processing(e) => e.into(),
            ResyncError::Store(e) => e.into(),
        }
    }
}
