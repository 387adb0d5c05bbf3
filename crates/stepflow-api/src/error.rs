//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use stepflow_engine::TriggerError;
use stepflow_protocols::StoreError;

/// Error returned by a handler, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Conflict(_) | StoreError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            StoreError::Invalid(_) => ApiError::BadRequest(err.to_string()),
            StoreError::Corrupt(_)
            | StoreError::ConnectionError(_)
            | StoreError::QueryError(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::Store(inner) => inner.into(),
            TriggerError::WorkflowNotFound(_) | TriggerError::ExecutionNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            TriggerError::Inactive(_) | TriggerError::DuplicateExecution(_) => {
                ApiError::Conflict(err.to_string())
            }
            TriggerError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            TriggerError::Dispatch(_) => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
