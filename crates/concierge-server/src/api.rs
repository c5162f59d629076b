//! Shared pieces of the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use concierge_db::DbPool;
use concierge_store::StoreError;
use rusqlite::Connection;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Runs `f` against a pooled connection on the blocking thread pool.
///
/// Store errors are logged and surfaced as a 500 carrying `context`;
/// `NotFound` is left for the caller to map through `f`'s own result.
pub(crate) async fn with_conn<T, F>(pool: &DbPool, context: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {e}")))?;
        f(&*conn).map_err(|e| match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => {
                tracing::error!(error = %other, "{}", context);
                ApiError::InternalServerError(context.to_string())
            }
        })
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {e}")))?
}
