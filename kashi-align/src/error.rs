//! Error types for kashi-align
//!
//! Maps each failure class to an HTTP status:
//! - validation → 422
//! - audio fetch → 400 (caller-supplied URL)
//! - tooling, reconciliation, anything else → 500

use crate::pipeline::PipelineError;
use crate::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request (422)
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// A pipeline stage failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Pipeline(PipelineError::Fetch(_)) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Pipeline(err) => match err {
                PipelineError::Fetch(_) => "FETCH_ERROR",
                PipelineError::ToolMissing { .. } => "TOOL_MISSING",
                PipelineError::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
                PipelineError::Reconciliation(_) => "RECONCILIATION_ERROR",
                PipelineError::Unexpected { .. } => "UNEXPECTED_ERROR",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            ApiError::Validation(err) => json!({
                "error": {
                    "code": code,
                    "message": err.to_string(),
                }
            }),
            ApiError::Pipeline(err) => json!({
                "error": {
                    "code": code,
                    "stage": err.stage().as_str(),
                    "message": err.to_string(),
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
