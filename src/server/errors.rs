use axum::extract::rejection::JsonRejection;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::RagError;

/// Errors returned to HTTP clients as `{"error": message}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unprocessable request: {0}")]
    Unprocessable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        match *self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::NotFound(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(msg) => ApiError::Unprocessable(msg),
            RagError::Embedding(msg) | RagError::BackendUnavailable(msg) => {
                warn!("Embedding backend failure: {}", msg);
                ApiError::ServiceUnavailable(format!("Embedding backend unavailable: {}", msg))
            }
            RagError::CollectionNotFound(_) => ApiError::ServiceUnavailable(err.to_string()),
            other => {
                error!("Request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        match rejection {
            JsonRejection::JsonDataError(_) => ApiError::Unprocessable(message),
            _ => ApiError::BadRequest(message),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> axum::response::Response {
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}
