//! # pdf2sheet
//!
//! Take a PDF, pull out every embedded image, publish the images on Google
//! Drive and append one row per image to a Google Sheets worksheet.
//!
//! ## Why render instead of dumping bitmaps?
//!
//! Scanned forms and signed documents often store their logo or signature
//! sideways or mirrored and straighten it with the page transform. Writing
//! the stored bitmap gives a picture that does not match the page. This
//! crate locates where each image is painted and renders that box of the
//! page with pdfium, falling back to the stored bytes only when no
//! placement can be found.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract  image_1.png … image_N.png   (lopdf + pdfium, spawn_blocking)
//!  ├─ 2. Upload   Drive, anyone-with-link     (3 attempts, 2 s apart)
//!  └─ 3. Sheet    rows A–D, IMAGE() in E,     (resumed on 429)
//!                 LOGO / FIRMA in F
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2sheet::{CredentialSource, Pipeline, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .spreadsheet_id("1pS7c5PmDUwENaY61jgHWUwSaH8Py1QeYkefoXeWl3Vo")
//!         .drive_folder_id("1qq-fmDrV_i2YqkfHwiQcYoxPSe4u4SrW")
//!         .build()?;
//!     let credentials = CredentialSource::AuthorizedUser { token_path: "token.json".into() };
//!
//!     let pipeline = Pipeline::connect(config, credentials)?;
//!     let report = pipeline.process_file(Path::new("form.pdf"), "bulco").await?;
//!     println!("{:?}", report.outcome());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2sheet` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2sheet = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod google;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;
pub mod web;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CredentialSource, PipelineConfig, PipelineConfigBuilder, RetryPolicy, ServerConfig,
    WorksheetAllowList, DEFAULT_WORKSHEETS,
};
pub use error::{ItemError, PipelineError, RemoteError};
pub use output::{
    ExtractedImage, ExtractionMethod, ExtractionReport, Outcome, PipelineReport,
    SheetUpdateReport, UploadBatch, UploadedImage,
};
pub use pipeline::extract::{ImageExtractor, PdfImageExtractor};
pub use pipeline::sheet::SheetService;
pub use pipeline::upload::{CreatedFile, StorageService};
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback, Stage};
pub use run::Pipeline;
