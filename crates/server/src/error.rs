// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use markbook_core::{JobError, JobStatus};

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Current job status, set on conflict responses so the caller can
    /// decide whether to keep polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            status: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
            status: None,
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed submission, rejected synchronously; no job record exists.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown id, either never issued or already evicted. The two cases are
    /// deliberately indistinguishable.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Result requested before the job completed (or after it failed).
    #[error("Job not ready: currently {status}")]
    NotReady {
        status: JobStatus,
        error: Option<JobError>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Validation(msg) => {
                tracing::warn!(message = %msg, "Invalid submission");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid submission", msg.clone()),
                )
            }
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new("Job not found"))
            }
            ApiError::NotReady { status, error } => {
                tracing::warn!(job_status = %status, "Result requested before completion");
                let mut body = match error {
                    Some(e) => ErrorResponse::with_details("Job failed", e.message.clone()),
                    None => ErrorResponse::new(format!("Job not completed. Current status: {status}")),
                };
                body.status = Some(*status);
                (StatusCode::CONFLICT, body)
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
