//! Configuration types for the extraction → upload → sheet pipeline.
//!
//! Pipeline behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The web front end adds a [`ServerConfig`] and a
//! [`WorksheetAllowList`]; credentials are chosen with [`CredentialSource`].

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Worksheets the operators work with, one per person.
pub const DEFAULT_WORKSHEETS: &[&str] = &[
    "bulco",
    "martin",
    "diego",
    "kdelacruz",
    "ncruz",
    "ccastro",
    "jbernal",
    "aguevara",
    "dbenitez",
    "dregalado",
    "mmoran",
    "evacacela",
    "jcarpio",
    "nmejia",
    "kprocel",
    "kvivas",
    "scachiguango",
    "talvarez",
];

/// Configuration for one pipeline instance.
///
/// # Example
/// ```rust
/// use pdf2sheet::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .spreadsheet_id("1pS7c5PmDUwENaY61jgHWUwSaH8Py1QeYkefoXeWl3Vo")
///     .drive_folder_id("1qq-fmDrV_i2YqkfHwiQcYoxPSe4u4SrW")
///     .zoom(3.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.zoom, 3.0);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Render zoom applied to placement regions. Range: 0.5–8.0. Default: 2.0.
    ///
    /// 2.0 renders a 72-DPI page region at 144 DPI, enough for logos and
    /// signatures to stay legible once the sheet scales them into a cell.
    pub zoom: f32,

    /// Keep the alpha channel of rendered regions. Default: false.
    pub render_alpha: bool,

    /// Retry policy for each Drive upload. Default: 3 attempts, 2 s apart.
    pub upload_retry: RetryPolicy,

    /// Retry policy for the sheet update on HTTP 429. Default: 3 attempts, 5 s apart.
    pub sheet_retry: RetryPolicy,

    /// Spreadsheet key (the long id in the sheet URL).
    pub spreadsheet_id: String,

    /// Drive folder that receives the uploaded images.
    pub drive_folder_id: String,

    /// Explicit path to libpdfium. If None, the system library is used.
    pub pdfium_library: Option<PathBuf>,

    /// Progress events for CLI / server observers.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            zoom: 2.0,
            render_alpha: false,
            upload_retry: RetryPolicy::new(3, Duration::from_secs(2)),
            sheet_retry: RetryPolicy::new(3, Duration::from_secs(5)),
            spreadsheet_id: String::new(),
            drive_folder_id: String::new(),
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("zoom", &self.zoom)
            .field("render_alpha", &self.render_alpha)
            .field("upload_retry", &self.upload_retry)
            .field("sheet_retry", &self.sheet_retry)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("drive_folder_id", &self.drive_folder_id)
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgress>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn zoom(mut self, zoom: f32) -> Self {
        self.config.zoom = zoom.clamp(0.5, 8.0);
        self
    }

    pub fn render_alpha(mut self, v: bool) -> Self {
        self.config.render_alpha = v;
        self
    }

    pub fn upload_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.upload_retry = policy;
        self
    }

    pub fn sheet_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.sheet_retry = policy;
        self
    }

    pub fn spreadsheet_id(mut self, id: impl Into<String>) -> Self {
        self.config.spreadsheet_id = id.into();
        self
    }

    pub fn drive_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.drive_folder_id = id.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if !c.zoom.is_finite() || c.zoom <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "zoom must be a positive number, got {}",
                c.zoom
            )));
        }
        if c.spreadsheet_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "spreadsheet id is required".into(),
            ));
        }
        if c.drive_folder_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Drive folder id is required".into(),
            ));
        }
        if c.upload_retry.max_attempts == 0 || c.sheet_retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "retry policies need at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

/// A fixed-delay, bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same attempt count, no pause. Used by tests and the `--no-wait` flag.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// Worksheet names an operator may pick in the submission form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetAllowList(Vec<String>);

impl Default for WorksheetAllowList {
    fn default() -> Self {
        Self(DEFAULT_WORKSHEETS.iter().map(|s| s.to_string()).collect())
    }
}

impl WorksheetAllowList {
    /// Build from any list of names; blanks are dropped and duplicates removed
    /// while keeping the first-seen order (the order shown in the form).
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        Self(out)
    }

    /// Parse a comma-separated list, e.g. from `PDF2SHEET_WORKSHEETS`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Settings for the submission web server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0:5050`.
    pub bind: SocketAddr,
    /// Where submissions are staged while they are processed. Default: `static/uploads`.
    pub upload_dir: PathBuf,
    /// Largest accepted request body in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,
    /// Worksheets listed in the form and accepted on submit.
    pub worksheets: WorksheetAllowList,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5050)),
            upload_dir: PathBuf::from("static/uploads"),
            max_upload_bytes: 20 * 1024 * 1024,
            worksheets: WorksheetAllowList::default(),
        }
    }
}

/// Where the Google access token comes from.
///
/// Both long-lived strategies grant the spreadsheets and drive scopes; the
/// pipeline only ever sees the resulting [`crate::google::TokenProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// `token.json` written by an earlier OAuth installed-app consent
    /// (client id, client secret, refresh token).
    AuthorizedUser { token_path: PathBuf },
    /// Service-account key file downloaded from the Cloud console.
    ServiceAccount { key_path: PathBuf },
    /// A ready access token, e.g. from `gcloud auth print-access-token`.
    AccessToken(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PipelineConfigBuilder {
        PipelineConfig::builder()
            .spreadsheet_id("sheet")
            .drive_folder_id("folder")
    }

    #[test]
    fn defaults_match_operational_values() {
        let c = valid().build().unwrap();
        assert_eq!(c.zoom, 2.0);
        assert!(!c.render_alpha);
        assert_eq!(c.upload_retry, RetryPolicy::new(3, Duration::from_secs(2)));
        assert_eq!(c.sheet_retry, RetryPolicy::new(3, Duration::from_secs(5)));
    }

    #[test]
    fn zoom_is_clamped() {
        assert_eq!(valid().zoom(100.0).build().unwrap().zoom, 8.0);
        assert_eq!(valid().zoom(0.01).build().unwrap().zoom, 0.5);
    }

    #[test]
    fn missing_ids_are_rejected() {
        let err = PipelineConfig::builder()
            .drive_folder_id("folder")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("spreadsheet"));

        let err = PipelineConfig::builder()
            .spreadsheet_id("sheet")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Drive folder"));
    }

    #[test]
    fn zero_attempt_policy_is_rejected() {
        assert!(valid().upload_retry(RetryPolicy::immediate(0)).build().is_err());
    }

    #[test]
    fn allow_list_parsing() {
        let list = WorksheetAllowList::parse(" bulco, martin ,,bulco,diego");
        assert_eq!(list.names(), &["bulco", "martin", "diego"]);
        assert!(list.contains("martin"));
        assert!(!list.contains("Martin"));
        assert!(!list.contains(""));
    }

    #[test]
    fn default_allow_list_has_all_operators() {
        let list = WorksheetAllowList::default();
        assert_eq!(list.names().len(), DEFAULT_WORKSHEETS.len());
        assert!(list.contains("talvarez"));
    }
}
