//! API error type mapping engine and storage failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use vitalwatch_core::EngineError;

use crate::storage::StorageError;
use crate::BackendError;

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request data (400).
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// Request was well-formed but semantically invalid (422).
    #[error("validation failed: {message}")]
    Validation {
        /// What validation failed.
        message: String,
    },

    /// Storage collaborator unavailable or failing (503).
    #[error("storage unavailable: {message}")]
    Storage {
        /// Underlying storage failure.
        message: String,
    },

    /// Anything unexpected (500).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Storage { .. } => "STORAGE_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Configuration { message } => Self::BadRequest { message },
            EngineError::Validation { message } => Self::Validation { message },
            EngineError::Storage { message } => Self::Storage { message },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Engine(engine) => engine.into(),
            BackendError::Storage(storage) => storage.into(),
            BackendError::Validation(message) => Self::Validation { message },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
        };

        match &self {
            ApiError::Internal { .. } | ApiError::Storage { .. } => {
                tracing::error!(error = %self, "API error");
            }
            _ => {
                tracing::warn!(error = %self, "API error");
            }
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let bad: ApiError = EngineError::configuration("unknown detector kind 'x'").into();
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let storage: ApiError = StorageError::Query("boom".into()).into();
        assert_eq!(storage.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let validation: ApiError = BackendError::Validation("missing activity".into()).into();
        assert_eq!(validation.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn error_codes() {
        let err = ApiError::BadRequest {
            message: "nope".into(),
        };
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }
}
