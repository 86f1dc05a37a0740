//! Mapping of failures to HTTP responses.

use super::pages;
use crate::error::PipelineError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebError {
    /// The form was incomplete or unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The multipart body could not be read (too large, malformed).
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// `err` followed by each of its sources, one per line.
pub fn diagnostic(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            WebError::Multipart(e) => (e.status(), e.body_text()).into_response(),
            WebError::Pipeline(e) if e.is_validation() => {
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            WebError::Pipeline(e) => {
                let detail = diagnostic(&e);
                tracing::error!("Submission failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(pages::error_page(&detail)),
                )
                    .into_response()
            }
        }
    }
}
