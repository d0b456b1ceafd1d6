//! Error types for relform-server
//!
//! Request failures render a generic failure page. Commit internals are
//! logged, never shown to the submitter.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::views;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unreadable multipart body; status from the extractor (400, or 413
    /// past the body limit)
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// Commit pipeline failure (500); the submission was not recorded
    #[error("Commit failed: {0}")]
    Commit(#[from] relform_common::Error),

    /// IO error while receiving the request
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Multipart(e) => (e.status(), e.body_text()),
            ApiError::Commit(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Your submission could not be recorded. Please try again later.".to_string(),
                )
            }
        };
        (status, Html(views::failure_page(&message))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
