//! API error types with HTTP response conversion.

use crate::error::GleanerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
}

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced over HTTP.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            code: self.code().to_string(),
        };
        tracing::error!(status = %status, message = %body.message, "API error");
        (status, Json(body)).into_response()
    }
}

impl From<GleanerError> for ApiError {
    fn from(err: GleanerError) -> Self {
        match err {
            GleanerError::NotFound(msg) => ApiError::NotFound(msg),
            GleanerError::Validation(msg) => ApiError::Validation(msg),
            GleanerError::Kg(kg_err @ kg::KgError::RollbackTarget { .. }) => {
                ApiError::BadRequest(kg_err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
