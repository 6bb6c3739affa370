//! Shared API error type and blocking-store helper.

use crate::text_model::TextError;
use crate::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coach_store::{SessionStore, StoreError};
use coach_types::SessionError;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing credential or configuration.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// A model or provider call failed.
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound("Interview not found".to_string()),
            StoreError::Session(e) => e.into(),
            other => {
                tracing::error!(error = %other, "session store failure");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<TextError> for ApiError {
    fn from(err: TextError) -> Self {
        match err {
            TextError::Unavailable(msg) => ApiError::Unavailable(msg),
            TextError::Upstream(msg) => ApiError::Upstream(msg),
        }
    }
}

/// Runs a blocking store operation on the blocking pool.
pub(crate) async fn with_store<T, F>(state: &Arc<AppState>, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SessionStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let result = tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(format!("task join error: {}", e)))??;
    Ok(result)
}
