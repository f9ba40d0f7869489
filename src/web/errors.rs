//! # Web API Error Types
//!
//! Errors returned by handlers and their HTTP response conversions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::services::QueryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found")]
    NotFound,

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn missing_order_id() -> Self {
        Self::bad_request("missing order id")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_code, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "order not found"),
            ApiError::BadRequest { message } => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", message.as_str())
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal error",
            ),
        };

        let error_response = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

/// Lookup failures are logged here and reported without detail
impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        error!(error = %err, "Order lookup failed");
        ApiError::Internal
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
