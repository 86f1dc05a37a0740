//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgress>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a submission moves through extraction, upload and the sheet
//! update. The CLI turns them into a progress bar; the server leaves them
//! unset and relies on `tracing`.
//!
//! # Example
//!
//! ```rust
//! use pdf2sheet::{PipelineConfig, PipelineProgress};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct UploadCounter(AtomicUsize);
//!
//! impl PipelineProgress for UploadCounter {
//!     fn on_upload_complete(&self, name: &str, _url: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("uploaded {name}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .spreadsheet_id("sheet")
//!     .drive_folder_id("folder")
//!     .progress_callback(Arc::new(UploadCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ExtractionMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three stages of a submission, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Extract,
    Upload,
    Sheet,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Upload => "upload",
            Stage::Sheet => "sheet",
        })
    }
}

/// Called by the pipeline as it processes a submission.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for one submission arrive from one task at a
/// time, but several submissions may share the same callback.
pub trait PipelineProgress: Send + Sync {
    /// Called when a stage begins. `items` is the number of units the stage
    /// will work on when known up front (files to upload, rows to write).
    fn on_stage_start(&self, stage: Stage, items: Option<usize>) {
        let _ = (stage, items);
    }

    /// Called for every image written to the extraction folder.
    fn on_image_extracted(&self, index: usize, page: usize, method: ExtractionMethod) {
        let _ = (index, page, method);
    }

    /// Called when a file has been uploaded and made public.
    fn on_upload_complete(&self, name: &str, url: &str) {
        let _ = (name, url);
    }

    /// Called when a file is given up on after its last attempt.
    fn on_upload_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once the sheet update has been written.
    fn on_sheet_updated(&self, worksheet: &str, start_row: u32, rows: usize) {
        let _ = (worksheet, start_row, rows);
    }

    /// Called when a stage ends, successfully or not.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<(Stage, bool)>>,
        uploads: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PipelineProgress for Recorder {
        fn on_stage_start(&self, stage: Stage, _items: Option<usize>) {
            self.stages.lock().unwrap().push((stage, true));
        }

        fn on_upload_complete(&self, _name: &str, _url: &str) {
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }

        fn on_upload_error(&self, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, stage: Stage) {
            self.stages.lock().unwrap().push((stage, false));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgress;
        cb.on_stage_start(Stage::Extract, None);
        cb.on_image_extracted(1, 1, ExtractionMethod::NamedPlacement);
        cb.on_upload_complete("image_1.png", "https://example.com");
        cb.on_upload_error("image_2.png", "boom");
        cb.on_sheet_updated("bulco", 4, 2);
        cb.on_stage_complete(Stage::Sheet);
    }

    #[test]
    fn recorder_receives_events() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Upload, Some(2));
        rec.on_upload_complete("image_1.png", "u1");
        rec.on_upload_error("image_2.png", "HTTP 500");
        rec.on_stage_complete(Stage::Upload);

        assert_eq!(rec.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(rec.errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![(Stage::Upload, true), (Stage::Upload, false)]
        );
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Extract.to_string(), "extract");
        assert_eq!(Stage::Sheet.to_string(), "sheet");
    }
}
