//! Remote uploader: push every extracted image to Drive and make it public.
//!
//! Files are enumerated, filtered to known image extensions and sorted by the
//! number embedded in their name before anything is sent, so `image_2.png`
//! is always uploaded before `image_10.png` whatever order the directory
//! listing returns.
//!
//! Each file gets up to `RetryPolicy::max_attempts` tries. A file created on
//! Drive whose permission call failed is not uploaded again; only the
//! permission is retried. A file that still fails is recorded in
//! [`UploadBatch::failures`] and the batch moves on.

use crate::config::RetryPolicy;
use crate::error::{ItemError, PipelineError, RemoteError};
use crate::output::{UploadBatch, UploadedImage};
use crate::progress::{PipelineProgress, Stage};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extensions the uploader recognises, lower-case, without the dot.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// A file as reported back by the storage service after creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

/// The storage operations the uploader needs.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Create `name` with `bytes` inside `folder_id`.
    async fn create_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        folder_id: &str,
    ) -> Result<CreatedFile, RemoteError>;

    /// Let anyone holding the link read the file.
    async fn grant_public_read(&self, file_id: &str) -> Result<(), RemoteError>;
}

/// MIME type for a recognised image extension (case-insensitive).
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// URL under which the sheet's `IMAGE()` formula can fetch the file.
pub fn public_view_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=view&id={file_id}")
}

/// Every decimal digit in `name`, concatenated and read as one number.
///
/// `img10.png` → 10, `scan_2_v3.png` → 23, `logo.png` → 0. Saturates rather
/// than overflowing on absurdly long digit runs.
pub fn digit_key(name: &str) -> u128 {
    name.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u128, |acc, d| acc.saturating_mul(10).saturating_add(d as u128))
}

/// Image files directly inside `folder`, ordered by [`digit_key`] then name.
pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(folder).map_err(|e| PipelineError::io(folder, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(folder, e))?.path();
        if !path.is_file() {
            debug!("Skipping {} (not a file)", path.display());
            continue;
        }
        let recognised = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .is_some();
        if !recognised {
            debug!("Skipping {} (not an image)", path.display());
            continue;
        }
        files.push(path);
    }

    files.sort_by_cached_key(|p| {
        let name = file_name(p);
        (digit_key(&name), name)
    });
    Ok(files)
}

/// Upload every image in `folder` to `drive_folder_id`.
///
/// Only an unreadable folder is fatal; individual files fail into
/// [`UploadBatch::failures`].
pub async fn upload_folder(
    storage: &dyn StorageService,
    folder: &Path,
    drive_folder_id: &str,
    policy: RetryPolicy,
    progress: Option<&dyn PipelineProgress>,
) -> Result<UploadBatch, PipelineError> {
    let files = list_images(folder)?;
    info!("Uploading {} images from {}", files.len(), folder.display());
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Upload, Some(files.len()));
    }

    let mut batch = UploadBatch::default();
    for path in &files {
        let name = file_name(path);
        match upload_one(storage, path, &name, drive_folder_id, policy).await {
            Ok(uploaded) => {
                debug!("  {} → {}", uploaded.name, uploaded.url);
                if let Some(cb) = progress {
                    cb.on_upload_complete(&uploaded.name, &uploaded.url);
                }
                batch.uploaded.push(uploaded);
            }
            Err(detail) => {
                warn!(
                    "{}: giving up after {} attempts: {}",
                    name, policy.max_attempts, detail
                );
                if let Some(cb) = progress {
                    cb.on_upload_error(&name, &detail);
                }
                batch.failures.push(ItemError::UploadFailed {
                    file: name,
                    attempts: policy.max_attempts,
                    detail,
                });
            }
        }
    }

    info!(
        "Uploaded {}/{} images",
        batch.len(),
        batch.len() + batch.failures.len()
    );
    if let Some(cb) = progress {
        cb.on_stage_complete(Stage::Upload);
    }
    Ok(batch)
}

async fn upload_one(
    storage: &dyn StorageService,
    path: &Path,
    name: &str,
    drive_folder_id: &str,
    policy: RetryPolicy,
) -> Result<UploadedImage, String> {
    let mime = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .unwrap_or("image/jpeg");

    let mut created: Option<CreatedFile> = None;
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay).await;
        }

        match attempt_upload(storage, path, name, mime, drive_folder_id, &mut created).await {
            Ok(file) => {
                let display = if file.name.is_empty() {
                    name.to_string()
                } else {
                    file.name
                };
                return Ok(UploadedImage {
                    url: public_view_url(&file.id),
                    name: display,
                    id: file.id,
                });
            }
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    name, attempt, policy.max_attempts, e
                );
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// One try: create the file unless an earlier try already did, then share it.
async fn attempt_upload(
    storage: &dyn StorageService,
    path: &Path,
    name: &str,
    mime: &str,
    drive_folder_id: &str,
    created: &mut Option<CreatedFile>,
) -> Result<CreatedFile, String> {
    let file = match created.take() {
        Some(file) => file,
        None => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| format!("read failed: {e}"))?;
            storage
                .create_file(name, mime, bytes, drive_folder_id)
                .await
                .map_err(|e| e.to_string())?
        }
    };
    match storage.grant_public_read(&file.id).await {
        Ok(()) => Ok(file),
        Err(e) => {
            *created = Some(file);
            Err(e.to_string())
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
