//! Unified error handling for shelfd.
//!
//! The books API maps everything to `ApiError`, which renders a JSON body
//! with a stable machine-readable code. Database details never reach the
//! wire; they are logged and replaced with a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::DbError;

/// Errors that can occur while handling a books request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("book not found: {0}")]
    NotFound(i64),

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Database(#[from] DbError),
}

impl ApiError {
    /// Get a static error code string for logs and clients.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Database(_) => "database",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Database(e) => {
                error!("Books handler database error: {}", e);
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": self.error_code(),
            "message": message,
        });
        (self.status(), Json(body)).into_response()
    }
}
