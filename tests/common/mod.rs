//! In-memory stand-ins for the extractor, Drive and Sheets.

#![allow(dead_code)]

use async_trait::async_trait;
use pdf2sheet::{
    CreatedFile, ExtractedImage, ExtractionMethod, ExtractionReport, ImageExtractor, ItemError,
    Pipeline, PipelineConfig, PipelineError, RemoteError, RetryPolicy, SheetService,
    StorageService,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const STUB_PNG: &[u8] = b"\x89PNG\r\n\x1a\n stub";

// ── Extractor ────────────────────────────────────────────────────────────────

/// Writes `images` stub files and reports `failures` as lost images.
#[derive(Default)]
pub struct FakeExtractor {
    pub images: usize,
    pub failures: Vec<ItemError>,
}

impl FakeExtractor {
    pub fn with_images(images: usize) -> Self {
        Self {
            images,
            failures: Vec::new(),
        }
    }
}

impl ImageExtractor for FakeExtractor {
    fn extract(&self, pdf_path: &Path, output_dir: &Path) -> Result<ExtractionReport, PipelineError> {
        if !pdf_path.is_file() {
            return Err(PipelineError::FileNotFound {
                path: pdf_path.to_path_buf(),
            });
        }
        std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::Internal(e.to_string()))?;
        let mut report = ExtractionReport {
            images: Vec::new(),
            failures: self.failures.clone(),
        };
        for index in 1..=self.images {
            let path = output_dir.join(format!("image_{index}.png"));
            std::fs::write(&path, STUB_PNG).map_err(|e| PipelineError::Internal(e.to_string()))?;
            report.images.push(ExtractedImage {
                index,
                page: 1,
                xref: 10 + index as u32,
                path,
                method: ExtractionMethod::NamedPlacement,
            });
        }
        Ok(report)
    }
}

// ── Drive ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StorageState {
    /// File name of every create call, in order.
    pub created: Vec<String>,
    /// File id of every permission call, in order.
    pub shared: Vec<String>,
    /// Remaining failing create calls per file name.
    pub create_failures: HashMap<String, u32>,
    /// Remaining failing permission calls per file id.
    pub share_failures: HashMap<String, u32>,
}

#[derive(Default)]
pub struct FakeStorage {
    state: Mutex<StorageState>,
}

impl FakeStorage {
    pub fn failing_create(name: &str, times: u32) -> Self {
        let storage = Self::default();
        storage
            .state()
            .create_failures
            .insert(name.to_string(), times);
        storage
    }

    pub fn failing_share(file_id: &str, times: u32) -> Self {
        let storage = Self::default();
        storage
            .state()
            .share_failures
            .insert(file_id.to_string(), times);
        storage
    }

    pub fn state(&self) -> MutexGuard<'_, StorageState> {
        self.state.lock().unwrap()
    }
}

/// Drive ids are derived from the name: `image_3.png` → `id-image_3`.
pub fn file_id(name: &str) -> String {
    format!("id-{}", name.trim_end_matches(".png"))
}

fn take_failure(map: &mut HashMap<String, u32>, key: &str) -> bool {
    match map.get_mut(key) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    async fn create_file(
        &self,
        name: &str,
        _mime_type: &str,
        _bytes: Vec<u8>,
        _folder_id: &str,
    ) -> Result<CreatedFile, RemoteError> {
        let mut state = self.state();
        state.created.push(name.to_string());
        if take_failure(&mut state.create_failures, name) {
            return Err(RemoteError::Status {
                service: "drive",
                status: 500,
                body: "backendError".into(),
            });
        }
        Ok(CreatedFile {
            id: file_id(name),
            name: name.to_string(),
            web_view_link: None,
        })
    }

    async fn grant_public_read(&self, file_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.shared.push(file_id.to_string());
        if take_failure(&mut state.share_failures, file_id) {
            return Err(RemoteError::Transport {
                service: "drive",
                detail: "connection reset".into(),
            });
        }
        Ok(())
    }
}

// ── Sheets ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SheetCall {
    Range {
        worksheet: String,
        range: String,
        rows: Vec<Vec<String>>,
    },
    Formulas {
        worksheet: String,
        cells: Vec<(String, String)>,
    },
    Cell {
        worksheet: String,
        cell: String,
        value: String,
    },
}

impl SheetCall {
    pub fn worksheet(&self) -> &str {
        match self {
            SheetCall::Range { worksheet, .. }
            | SheetCall::Formulas { worksheet, .. }
            | SheetCall::Cell { worksheet, .. } => worksheet,
        }
    }
}

#[derive(Debug, Default)]
pub struct SheetState {
    /// Column A of every existing worksheet.
    pub column_a: HashMap<String, Vec<String>>,
    pub calls: Vec<SheetCall>,
    /// Attempts started, counted by existence checks.
    pub attempts: u32,
    /// Upcoming attempts answered with HTTP 429.
    pub rate_limited: u32,
    /// Answer every attempt with this status instead.
    pub fail_status: Option<u16>,
    /// Upcoming formula writes answered with HTTP 429.
    pub rate_limited_formulas: u32,
    /// Answer the next write to this cell with HTTP 429.
    pub rate_limited_cell: Option<String>,
}

pub struct FakeSheets {
    state: Mutex<SheetState>,
}

impl FakeSheets {
    /// Worksheets with a single header row.
    pub fn with_worksheets(names: &[&str]) -> Self {
        let column_a = names
            .iter()
            .map(|n| (n.to_string(), vec!["Nombre".to_string()]))
            .collect();
        Self {
            state: Mutex::new(SheetState {
                column_a,
                ..Default::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, SheetState> {
        self.state.lock().unwrap()
    }

    pub fn calls_for(&self, worksheet: &str) -> Vec<SheetCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.worksheet() == worksheet)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SheetService for FakeSheets {
    fn spreadsheet_id(&self) -> &str {
        "test-spreadsheet"
    }

    async fn worksheet_exists(&self, worksheet: &str) -> Result<bool, RemoteError> {
        let mut state = self.state();
        state.attempts += 1;
        if state.rate_limited > 0 {
            state.rate_limited -= 1;
            return Err(RemoteError::RateLimited { service: "sheets" });
        }
        if let Some(status) = state.fail_status {
            return Err(RemoteError::Status {
                service: "sheets",
                status,
                body: "failure".into(),
            });
        }
        Ok(state.column_a.contains_key(worksheet))
    }

    async fn column_values(&self, worksheet: &str, _column: &str) -> Result<Vec<String>, RemoteError> {
        // Give concurrent submissions a chance to interleave.
        tokio::task::yield_now().await;
        Ok(self
            .state()
            .column_a
            .get(worksheet)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_range(
        &self,
        worksheet: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), RemoteError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        let column = state.column_a.entry(worksheet.to_string()).or_default();
        column.extend(rows.iter().map(|r| r.first().cloned().unwrap_or_default()));
        state.calls.push(SheetCall::Range {
            worksheet: worksheet.to_string(),
            range: range.to_string(),
            rows,
        });
        Ok(())
    }

    async fn update_formulas(
        &self,
        worksheet: &str,
        cells: Vec<(String, String)>,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        if state.rate_limited_formulas > 0 {
            state.rate_limited_formulas -= 1;
            return Err(RemoteError::RateLimited { service: "sheets" });
        }
        state.calls.push(SheetCall::Formulas {
            worksheet: worksheet.to_string(),
            cells,
        });
        Ok(())
    }

    async fn update_cell(&self, worksheet: &str, cell: &str, value: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        if state.rate_limited_cell.as_deref() == Some(cell) {
            state.rate_limited_cell = None;
            return Err(RemoteError::RateLimited { service: "sheets" });
        }
        state.calls.push(SheetCall::Cell {
            worksheet: worksheet.to_string(),
            cell: cell.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Production attempt counts without the pauses.
pub fn config() -> PipelineConfig {
    PipelineConfig::builder()
        .spreadsheet_id("test-spreadsheet")
        .drive_folder_id("drive-folder")
        .upload_retry(RetryPolicy::immediate(3))
        .sheet_retry(RetryPolicy::immediate(3))
        .build()
        .unwrap()
}

pub fn pipeline(
    extractor: FakeExtractor,
    storage: Arc<FakeStorage>,
    sheets: Arc<FakeSheets>,
) -> Pipeline {
    init_tracing();
    Pipeline::new(config(), Arc::new(extractor), storage, sheets)
}

/// A file that passes the existence and magic-number checks.
pub fn pdf_file(dir: &Path) -> PathBuf {
    let path = dir.join("form.pdf");
    std::fs::write(&path, b"%PDF-1.4\n%stub\n").unwrap();
    path
}
