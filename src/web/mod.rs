//! Submission web front end.
//!
//! | Route                  | Purpose                                        |
//! |------------------------|------------------------------------------------|
//! | `GET /`                | upload form listing the selectable worksheets  |
//! | `POST /`               | multipart submit: `pdf_file`, `sheet_name`     |
//! | `GET /success/:sheet`  | confirmation page                              |
//! | `GET /health`          | liveness, answers `ok`                         |

mod error;
mod handlers;
pub mod pages;

pub use error::WebError;

use crate::config::{ServerConfig, WorksheetAllowList};
use crate::error::PipelineError;
use crate::run::Pipeline;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub worksheets: Arc<WorksheetAllowList>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, worksheets: WorksheetAllowList) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            worksheets: Arc::new(worksheets),
        }
    }
}

/// Build the router. `max_upload_bytes` caps the request body.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::submit))
        .route("/success/:sheet_name", get(handlers::success))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: ServerConfig, pipeline: Pipeline) -> Result<(), PipelineError> {
    if config.worksheets.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "the worksheet list is empty".into(),
        ));
    }
    let pipeline = pipeline.with_work_root(&config.upload_dir);
    let app = router(
        AppState::new(pipeline, config.worksheets.clone()),
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| PipelineError::Internal(format!("cannot bind {}: {e}", config.bind)))?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app)
        .await
        .map_err(|e| PipelineError::Internal(format!("server error: {e}")))
}
