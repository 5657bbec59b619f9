use std::any::Any;

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use cranewatch_core::error::CoreError;
use cranewatch_pipeline::ingest::IngestError;
use cranewatch_pipeline::queue::QueueError;
use serde_json::json;

/// Seconds a client should wait before retrying a refused ingestion.
const RETRY_AFTER_SECS: &str = "1";

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`QueueError`] for ingestion
/// backpressure. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `cranewatch_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The ingestion queue refused the payload.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// An internal error. The message is logged, never returned.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Malformed(e) => AppError::Core(e),
            IngestError::Queue(e) => AppError::Queue(e),
        }
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::MalformedBatch(_) | CoreError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", core.to_string())
                }
                CoreError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string())
                }
            },

            // --- Backpressure ---
            AppError::Queue(QueueError::Full { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_FULL",
                self.to_string(),
            ),
            AppError::Queue(QueueError::Closed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Server is shutting down".to_string(),
            ),

            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, AppError::Queue(QueueError::Full { .. })) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Response for a handler that panicked, used by `CatchPanicLayer`.
///
/// The panic message is logged; the client only sees the generic 500 body.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    AppError::InternalError(format!("Handler panicked: {message}")).into_response()
}
