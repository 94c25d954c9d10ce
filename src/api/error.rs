use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::registry::RegistryError;
use crate::storage::StorageError;
use crate::worker::RunnerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("no job registered for key {0}")]
    JobNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("job {0} has already finished")]
    JobFinished(String),
    #[error("format listing failed: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::JobNotFound(_) | ApiError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::JobFinished(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::JobNotFound(_) | ApiError::FileNotFound(_) => "NOT_FOUND",
            ApiError::JobFinished(_) => "JOB_FINISHED",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Coarse status string; polling clients key off `not_found`
    pub fn status(&self) -> &'static str {
        match self {
            ApiError::JobNotFound(_) | ApiError::FileNotFound(_) => "not_found",
            _ => "error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            status: self.status(),
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidInput(value.to_string())
    }
}

impl From<RunnerError> for ApiError {
    fn from(value: RunnerError) -> Self {
        match value {
            RunnerError::InvalidInput(message) => ApiError::InvalidInput(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::NotFound(key) => ApiError::JobNotFound(key),
            RegistryError::AlreadyFinished(key) => ApiError::JobFinished(key),
            other @ (RegistryError::InvalidUrl(_) | RegistryError::InvalidFormat(_)) => {
                ApiError::InvalidInput(other.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InvalidName(name) => {
                ApiError::InvalidInput(format!("invalid file name: {name}"))
            }
            StorageError::NotFound(name) => ApiError::FileNotFound(name),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
