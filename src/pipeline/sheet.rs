//! Sheet updater: append one row per uploaded image to a worksheet.
//!
//! Layout of every row written, starting at the first empty row of column A:
//!
//! | A    | B   | C | D         | E                  | F                 |
//! |------|-----|---|-----------|--------------------|-------------------|
//! | name | url |   | timestamp | `=IMAGE("<url>")`  | `LOGO` / `FIRMA`  |
//!
//! `LOGO` marks the first new row; `FIRMA` marks the last one when more than
//! one row was written. Rows are ordered by the number embedded in the image
//! name, so `img2` precedes `img10`.
//!
//! Only HTTP 429 is retried. A retry resumes at the step that was rate
//! limited: once the rows are placed they are never appended a second time.
//! Any other failure ends the update and is returned to the caller.

use crate::config::RetryPolicy;
use crate::error::{PipelineError, RemoteError};
use crate::output::{SheetUpdateReport, UploadBatch, UploadedImage};
use crate::pipeline::upload::{digit_key, public_view_url};
use crate::progress::{PipelineProgress, Stage};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Timestamp written to column D.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker written to column F of the first new row.
pub const FIRST_ROW_MARKER: &str = "LOGO";

/// Marker written to column F of the last new row.
pub const LAST_ROW_MARKER: &str = "FIRMA";

/// Worksheet operations the updater needs, scoped to one spreadsheet.
#[async_trait]
pub trait SheetService: Send + Sync {
    /// Key of the spreadsheet this service writes to.
    fn spreadsheet_id(&self) -> &str;

    async fn worksheet_exists(&self, worksheet: &str) -> Result<bool, RemoteError>;

    /// Values of `column` (e.g. `"A"`) from row 1 down to the last non-empty cell.
    async fn column_values(&self, worksheet: &str, column: &str) -> Result<Vec<String>, RemoteError>;

    /// Write `rows` as literal values into `range` (A1 notation, no sheet prefix).
    async fn update_range(
        &self,
        worksheet: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), RemoteError>;

    /// Write `(cell, formula)` pairs, interpreted as user input.
    async fn update_formulas(
        &self,
        worksheet: &str,
        cells: Vec<(String, String)>,
    ) -> Result<(), RemoteError>;

    /// Write one literal value.
    async fn update_cell(&self, worksheet: &str, cell: &str, value: &str) -> Result<(), RemoteError>;
}

/// `=IMAGE(...)` formula rendering the Drive file inline.
pub fn image_formula(file_id: &str) -> String {
    format!("=IMAGE(\"{}\")", public_view_url(file_id))
}

/// The rows that will be written, already ordered and filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRows {
    /// Entries with both a name and a URL, ordered by [`digit_key`].
    pub entries: Vec<UploadedImage>,
    /// Entries dropped for an empty name or URL.
    pub skipped: usize,
}

/// Order `uploads` by the number in each name (stable) and drop unusable entries.
pub fn plan_rows(uploads: &[UploadedImage]) -> PlannedRows {
    let mut sorted: Vec<&UploadedImage> = uploads.iter().collect();
    sorted.sort_by_key(|u| digit_key(&u.name));

    let (entries, dropped): (Vec<&UploadedImage>, Vec<&UploadedImage>) = sorted
        .into_iter()
        .partition(|u| !u.name.is_empty() && !u.url.is_empty());

    PlannedRows {
        entries: entries.into_iter().cloned().collect(),
        skipped: dropped.len(),
    }
}

/// Cells A–D for one entry.
pub fn row_values(entry: &UploadedImage, timestamp: &str) -> Vec<String> {
    vec![
        entry.name.clone(),
        entry.url.clone(),
        String::new(),
        timestamp.to_string(),
    ]
}

/// Append `uploads` to `worksheet`, retrying on HTTP 429.
pub async fn update_sheet(
    sheets: &dyn SheetService,
    worksheet: &str,
    uploads: &UploadBatch,
    policy: RetryPolicy,
    progress: Option<&dyn PipelineProgress>,
) -> Result<SheetUpdateReport, PipelineError> {
    let plan = plan_rows(&uploads.uploaded);
    if plan.skipped > 0 {
        warn!("{}: skipping {} entries without name or URL", worksheet, plan.skipped);
    }
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Sheet, Some(plan.entries.len()));
    }

    let result = write_with_retry(sheets, worksheet, &plan, policy).await;

    if let Some(cb) = progress {
        if let Ok(report) = &result {
            cb.on_sheet_updated(&report.worksheet, report.start_row, report.rows_written);
        }
        cb.on_stage_complete(Stage::Sheet);
    }
    result
}

async fn write_with_retry(
    sheets: &dyn SheetService,
    worksheet: &str,
    plan: &PlannedRows,
    policy: RetryPolicy,
) -> Result<SheetUpdateReport, PipelineError> {
    let mut written = Written::default();
    for attempt in 1..=policy.max_attempts {
        match write_rows(sheets, worksheet, plan, &mut written).await {
            Ok(start_row) => {
                info!(
                    "{}: wrote {} rows from row {} (attempt {})",
                    worksheet,
                    plan.entries.len(),
                    start_row,
                    attempt
                );
                return Ok(SheetUpdateReport {
                    worksheet: worksheet.to_string(),
                    start_row,
                    rows_written: plan.entries.len(),
                    rows_skipped: plan.skipped,
                    attempts: attempt,
                });
            }
            Err(PipelineError::Remote(e)) if e.is_rate_limited() => {
                if attempt < policy.max_attempts {
                    warn!(
                        "{}: rate limited (attempt {}/{}), retrying in {:?}",
                        worksheet, attempt, policy.max_attempts, policy.delay
                    );
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => {
                warn!("{}: update abandoned: {}", worksheet, e);
                return Err(e);
            }
        }
    }

    warn!(
        "{}: still rate limited after {} attempts",
        worksheet, policy.max_attempts
    );
    Err(PipelineError::RateLimitExhausted {
        service: "sheets".into(),
        attempts: policy.max_attempts,
    })
}

/// Steps of an update that an earlier attempt already completed.
#[derive(Debug, Default)]
struct Written {
    /// Row the A–D range was written at.
    placed: Option<u32>,
    formulas: bool,
    first_marker: bool,
}

/// One attempt, skipping whatever `written` says is done. Returns the first
/// row written to.
async fn write_rows(
    sheets: &dyn SheetService,
    worksheet: &str,
    plan: &PlannedRows,
    written: &mut Written,
) -> Result<u32, PipelineError> {
    let start_row = match written.placed {
        Some(row) => {
            debug!("{}: rows already at {}, resuming", worksheet, row);
            row
        }
        None => {
            let start_row = first_empty_row(sheets, worksheet).await?;
            if plan.entries.is_empty() {
                debug!("{}: nothing to write", worksheet);
                return Ok(start_row);
            }
            let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
            let rows: Vec<Vec<String>> = plan
                .entries
                .iter()
                .map(|entry| row_values(entry, &timestamp))
                .collect();
            let end_row = start_row + plan.entries.len() as u32 - 1;
            sheets
                .update_range(worksheet, &format!("A{start_row}:D{end_row}"), rows)
                .await?;
            written.placed = Some(start_row);
            start_row
        }
    };
    let end_row = start_row + plan.entries.len() as u32 - 1;

    if !written.formulas {
        let formulas: Vec<(String, String)> = plan
            .entries
            .iter()
            .zip(start_row..)
            .map(|(entry, row)| (format!("E{row}"), image_formula(&entry.id)))
            .collect();
        sheets.update_formulas(worksheet, formulas).await?;
        written.formulas = true;
    }

    if !written.first_marker {
        sheets
            .update_cell(worksheet, &format!("F{start_row}"), FIRST_ROW_MARKER)
            .await?;
        written.first_marker = true;
    }
    if end_row > start_row {
        sheets
            .update_cell(worksheet, &format!("F{end_row}"), LAST_ROW_MARKER)
            .await?;
    }

    Ok(start_row)
}

/// Check the worksheet exists and find the row after the last value in column A.
async fn first_empty_row(sheets: &dyn SheetService, worksheet: &str) -> Result<u32, PipelineError> {
    if !sheets.worksheet_exists(worksheet).await? {
        return Err(PipelineError::WorksheetNotFound {
            name: worksheet.to_string(),
            spreadsheet_id: sheets.spreadsheet_id().to_string(),
        });
    }

    let filled = sheets.column_values(worksheet, "A").await?.len();
    u32::try_from(filled + 1)
        .map_err(|_| PipelineError::Internal(format!("{worksheet}: column A has {filled} rows")))
}
