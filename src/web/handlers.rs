//! Route handlers.

use super::error::WebError;
use super::{pages, AppState};
use crate::error::PipelineError;
use crate::output::Outcome;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::{debug, info};

/// Handler: GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Handler: GET /
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(pages::form_page(&state.worksheets))
}

/// Handler: GET /success/:sheet_name
pub async fn success(Path(sheet_name): Path<String>) -> Html<String> {
    Html(pages::success_page(&sheet_name))
}

/// The two form fields of a submission.
#[derive(Debug, Default)]
struct Submission {
    file_name: Option<String>,
    file_bytes: Vec<u8>,
    sheet_name: Option<String>,
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission, WebError> {
    let mut submission = Submission::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("pdf_file") => {
                submission.file_name = field.file_name().map(str::to_owned);
                submission.file_bytes = field.bytes().await?.to_vec();
            }
            Some("sheet_name") => {
                submission.sheet_name = Some(field.text().await?);
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }
    Ok(submission)
}

/// Handler: POST /
/// Where a complete submission is sent; the name becomes one path segment.
fn success_path(sheet_name: &str) -> String {
    format!("/success/{}", urlencoding::encode(sheet_name))
}

pub async fn submit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let submission = read_submission(multipart).await?;

    let file_name = submission
        .file_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| WebError::BadRequest("Invalid file: please upload a PDF.".into()))?;
    let sheet_name = submission
        .sheet_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WebError::BadRequest("Select a worksheet to update.".into()))?;
    if !state.worksheets.contains(&sheet_name) {
        return Err(PipelineError::WorksheetNotAllowed { name: sheet_name }.into());
    }

    info!(
        "Submission: '{}' ({} bytes) → worksheet '{}'",
        file_name,
        submission.file_bytes.len(),
        sheet_name
    );
    let report = state
        .pipeline
        .process_upload(&file_name, &submission.file_bytes, &sheet_name)
        .await?;

    Ok(match report.outcome() {
        Outcome::Complete => {
            Redirect::to(&success_path(&sheet_name)).into_response()
        }
        Outcome::Partial { failures } => {
            let rows = report.sheet.as_ref().map_or(0, |s| s.rows_written);
            (
                StatusCode::OK,
                Html(pages::partial_page(&sheet_name, rows, &failures)),
            )
                .into_response()
        }
        Outcome::Failed { reason } => {
            tracing::error!("Submission for '{}' failed: {}", sheet_name, reason);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::error_page(&reason)),
            )
                .into_response()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path_is_one_segment() {
        assert_eq!(success_path("bulco"), "/success/bulco");
        assert_eq!(success_path("a b/c"), "/success/a%20b%2Fc");
        assert_eq!(success_path("ñ"), "/success/%C3%B1");
        assert_eq!(success_path("O'Brien"), "/success/O%27Brien");
    }
}
