//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::review_service::ReviewError;
use crate::service::run_service::RunError;
use crate::service::transaction_service::TransactionError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Integrity violation, never retried by clients
    Conflict(String),
    StoreError(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => {
                tracing::error!("Integrity error: {}", msg);
                (StatusCode::CONFLICT, msg)
            }
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CompletedTransaction { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::StoreError(other),
        }
    }
}

impl From<TransactionError> for ApiError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Integrity(msg) => ApiError::Conflict(msg),
            TransactionError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            err @ (TransactionError::NotFound(_) | TransactionError::VmNotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            TransactionError::Store(err) => err.into(),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunError::ValidationError(msg) => ApiError::BadRequest(msg),
            RunError::IdsExhausted { .. } => ApiError::InternalError(err.to_string()),
            RunError::Store(err) => err.into(),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::Corrupt { .. } => ApiError::Conflict(err.to_string()),
            ReviewError::Run(err) => err.into(),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
