//! Error types for the pdf2sheet library.
//!
//! Three error types map to three failure scopes:
//!
//! * [`PipelineError`]: **Fatal** for a whole submission: the PDF cannot be
//!   opened, the worksheet does not exist, credentials cannot be loaded, the
//!   spreadsheet kept rate-limiting us. Returned as `Err(PipelineError)`.
//!
//! * [`ItemError`]: **Non-fatal**: one image failed to extract, or one file
//!   failed to upload after every attempt. Collected inside the stage reports
//!   in [`crate::output`] so a run with 8/10 uploads is visibly partial
//!   instead of silently "successful".
//!
//! * [`RemoteError`]: one call to Drive, Sheets or the OAuth endpoint failed.
//!   The stage that made the call decides whether it is retried, recorded as
//!   an [`ItemError`] or escalated to a [`PipelineError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2sheet library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The submission itself is unusable (wrong file type, missing field).
    #[error("{0}")]
    InvalidUpload(String),

    /// The worksheet is not one operators may select.
    #[error("Worksheet '{name}' is not in the list of available worksheets")]
    WorksheetNotAllowed { name: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDF2SHEET_PDFIUM_LIB=/path/to/libpdfium or install libpdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Remote errors ─────────────────────────────────────────────────────
    /// The spreadsheet has no worksheet with this title.
    #[error("Worksheet '{name}' does not exist in spreadsheet '{spreadsheet_id}'")]
    WorksheetNotFound {
        name: String,
        spreadsheet_id: String,
    },

    /// Credentials could not be loaded or refreshed.
    #[error("Google credentials unavailable: {0}")]
    Credentials(String),

    /// A remote call failed with an error that is not retried.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Every attempt was answered with HTTP 429.
    #[error("{service} kept rate-limiting the request; gave up after {attempts} attempts")]
    RateLimitExhausted { service: String, attempts: u32 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, write or list a local file or folder.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// `true` when the caller sent something unusable (HTTP 400 territory).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidUpload(_)
                | PipelineError::WorksheetNotAllowed { .. }
                | PipelineError::NotAPdf { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failed call to one of the Google services.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// HTTP 429: the service wants us to back off.
    #[error("{service}: rate limit exceeded (HTTP 429)")]
    RateLimited { service: &'static str },

    /// Any other non-success HTTP status.
    #[error("{service}: HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("{service}: request failed: {detail}")]
    Transport {
        service: &'static str,
        detail: String,
    },

    /// The response arrived but its body was not what the API documents.
    #[error("{service}: unexpected response: {detail}")]
    Decode {
        service: &'static str,
        detail: String,
    },
}

impl RemoteError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited { .. })
    }

    /// Map a failed response to the matching variant.
    pub(crate) fn from_status(service: &'static str, status: u16, body: String) -> Self {
        if status == 429 {
            RemoteError::RateLimited { service }
        } else {
            RemoteError::Status {
                service,
                status,
                body,
            }
        }
    }

    pub(crate) fn transport(service: &'static str, err: reqwest::Error) -> Self {
        RemoteError::Transport {
            service,
            detail: err.to_string(),
        }
    }
}

/// A non-fatal error for a single image or file.
///
/// Stored in [`crate::output::ExtractionReport`] and
/// [`crate::output::UploadBatch`]; the run continues with the next item.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// One embedded image could not be rendered or written.
    #[error("page {page}, image xref {xref}: {detail}")]
    ExtractFailed {
        page: usize,
        xref: u32,
        detail: String,
    },

    /// The image was written from its stored bitmap because nothing could be
    /// rendered; it may not face the way the page shows it.
    #[error("page {page}, image xref {xref}: written unrendered: {detail}")]
    RenderUnavailable {
        page: usize,
        xref: u32,
        detail: String,
    },

    /// One extracted file could not be uploaded and shared.
    #[error("{file}: upload failed after {attempts} attempts: {detail}")]
    UploadFailed {
        file: String,
        attempts: u32,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detected_from_status() {
        let e = RemoteError::from_status("sheets", 429, String::new());
        assert!(e.is_rate_limited());
        let e = RemoteError::from_status("sheets", 500, "boom".into());
        assert!(!e.is_rate_limited());
        assert!(e.to_string().contains("HTTP 500"));
    }

    #[test]
    fn validation_errors_map_to_bad_request() {
        assert!(PipelineError::InvalidUpload("no file".into()).is_validation());
        assert!(PipelineError::WorksheetNotAllowed { name: "x".into() }.is_validation());
        assert!(!PipelineError::Internal("x".into()).is_validation());
        assert!(!PipelineError::RateLimitExhausted {
            service: "sheets".into(),
            attempts: 3
        }
        .is_validation());
    }

    #[test]
    fn upload_failure_display() {
        let e = ItemError::UploadFailed {
            file: "image_4.png".into(),
            attempts: 3,
            detail: "HTTP 500".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("image_4.png"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
    }

    #[test]
    fn worksheet_not_found_display() {
        let e = PipelineError::WorksheetNotFound {
            name: "bulco".into(),
            spreadsheet_id: "abc".into(),
        };
        assert!(e.to_string().contains("bulco"));
    }
}
