//! Submission runner: extract → upload → sheet, strictly in sequence.
//!
//! [`Pipeline`] owns the three collaborators and the configuration. Every
//! run gets its own working directory (see [`crate::pipeline::input`]) so
//! nothing is shared on disk between submissions. Sheet updates for the
//! same worksheet are serialised with a per-worksheet lock; updates to
//! different worksheets still run side by side.

use crate::config::{CredentialSource, PipelineConfig};
use crate::error::PipelineError;
use crate::google::{self, DriveClient, SheetsClient};
use crate::output::{ExtractionReport, PipelineReport};
use crate::pipeline::extract::{ImageExtractor, PdfImageExtractor};
use crate::pipeline::input::{self, WorkDir};
use crate::pipeline::sheet::{self, SheetService};
use crate::pipeline::upload::{self, StorageService};
use crate::progress::{PipelineProgress, Stage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// The three-stage pipeline with its collaborators.
pub struct Pipeline {
    config: PipelineConfig,
    extractor: Arc<dyn ImageExtractor>,
    storage: Arc<dyn StorageService>,
    sheets: Arc<dyn SheetService>,
    work_root: Option<PathBuf>,
    worksheet_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn ImageExtractor>,
        storage: Arc<dyn StorageService>,
        sheets: Arc<dyn SheetService>,
    ) -> Self {
        Self {
            config,
            extractor,
            storage,
            sheets,
            work_root: None,
            worksheet_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: pdfium extractor, Drive and Sheets over HTTPS.
    pub fn connect(
        config: PipelineConfig,
        credentials: CredentialSource,
    ) -> Result<Self, PipelineError> {
        let http = google::http_client()?;
        let token = credentials.into_provider(http.clone())?;
        let extractor = Arc::new(PdfImageExtractor::new(&config));
        let storage = Arc::new(DriveClient::new(http.clone(), token.clone()));
        let sheets = Arc::new(SheetsClient::new(http, token, config.spreadsheet_id.clone()));
        Ok(Self::new(config, extractor, storage, sheets))
    }

    /// Create working directories under `root` instead of the system temp dir.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    /// Run all three stages on a PDF already on disk.
    pub async fn process_file(
        &self,
        pdf: &Path,
        worksheet: &str,
    ) -> Result<PipelineReport, PipelineError> {
        let work = input::stage_local(pdf, self.work_root.as_deref())?;
        self.run(&work, worksheet).await
    }

    /// Run all three stages on an uploaded PDF.
    ///
    /// `filename` is the name the client sent; it is validated and sanitised
    /// before anything touches the disk.
    pub async fn process_upload(
        &self,
        filename: &str,
        bytes: &[u8],
        worksheet: &str,
    ) -> Result<PipelineReport, PipelineError> {
        if worksheet.trim().is_empty() {
            return Err(PipelineError::InvalidUpload(
                "Select a worksheet to update.".into(),
            ));
        }
        let work = input::stage_upload(filename, bytes, self.work_root.as_deref()).await?;
        self.run(&work, worksheet).await
    }

    async fn run(&self, work: &WorkDir, worksheet: &str) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        info!("Processing {} for worksheet '{}'", work.pdf().display(), worksheet);
        let progress = self.progress();

        // ── Stage 1: extract ─────────────────────────────────────────────
        let images_dir = work.images();
        let extraction =
            extract_blocking(self.extractor.clone(), work.pdf(), &images_dir, progress.clone())
                .await?;

        // ── Stage 2: upload ──────────────────────────────────────────────
        let uploads = upload::upload_folder(
            self.storage.as_ref(),
            &images_dir,
            &self.config.drive_folder_id,
            self.config.upload_retry,
            progress.as_deref(),
        )
        .await?;

        // ── Stage 3: sheet ───────────────────────────────────────────────
        let lock = self.worksheet_lock(worksheet);
        let (sheet, sheet_error) = {
            let _guard = lock.lock().await;
            match sheet::update_sheet(
                self.sheets.as_ref(),
                worksheet,
                &uploads,
                self.config.sheet_retry,
                progress.as_deref(),
            )
            .await
            {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    warn!("Sheet update for '{}' failed: {}", worksheet, e);
                    (None, Some(e.to_string()))
                }
            }
        };

        let report = PipelineReport {
            worksheet: worksheet.to_string(),
            extraction,
            uploads,
            sheet,
            sheet_error,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Finished '{}' in {}ms: {} extracted, {} uploaded, {:?}",
            worksheet,
            report.duration_ms,
            report.extraction.count(),
            report.uploads.len(),
            report.outcome()
        );
        Ok(report)
    }

    fn progress(&self) -> Option<Arc<dyn PipelineProgress>> {
        self.config.progress_callback.clone()
    }

    fn worksheet_lock(&self, worksheet: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .worksheet_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(worksheet.to_string()).or_default().clone()
    }
}

/// Run the blocking extractor off the async executor.
async fn extract_blocking(
    extractor: Arc<dyn ImageExtractor>,
    pdf: &Path,
    output_dir: &Path,
    progress: Option<Arc<dyn PipelineProgress>>,
) -> Result<ExtractionReport, PipelineError> {
    if let Some(cb) = &progress {
        cb.on_stage_start(Stage::Extract, None);
    }
    let pdf = pdf.to_path_buf();
    let output_dir = output_dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || extractor.extract(&pdf, &output_dir))
        .await
        .map_err(|e| PipelineError::Internal(format!("extraction task panicked: {e}")))?;
    if let Some(cb) = &progress {
        cb.on_stage_complete(Stage::Extract);
    }
    result
}
