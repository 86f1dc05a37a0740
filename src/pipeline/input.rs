//! Submission staging: give every run its own working directory.
//!
//! Each submission is processed inside a fresh [`TempDir`]: the uploaded PDF
//! is written there and the extractor writes its images into `images/`
//! below it. Dropping the [`WorkDir`] removes everything, whether the run
//! succeeded, failed or panicked, and two submissions never share files.

use crate::error::PipelineError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Name used when sanitising leaves nothing of the uploaded file name.
const FALLBACK_NAME: &str = "upload.pdf";

/// A staged submission: the PDF to read and the folder to extract into.
#[derive(Debug)]
pub struct WorkDir {
    pdf: PathBuf,
    dir: TempDir,
}

impl WorkDir {
    pub fn pdf(&self) -> &Path {
        &self.pdf
    }

    /// Folder the extractor writes to and the uploader reads from.
    pub fn images(&self) -> PathBuf {
        self.dir.path().join("images")
    }
}

fn new_temp_dir(root: Option<&Path>) -> Result<TempDir, PipelineError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pdf2sheet-");
    match root {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(|e| PipelineError::io(root, e))?;
            builder.tempdir_in(root).map_err(|e| PipelineError::io(root, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| PipelineError::io(std::env::temp_dir(), e)),
    }
}

/// Stage a PDF already on disk. The file is read in place, not copied.
pub fn stage_local(pdf: &Path, root: Option<&Path>) -> Result<WorkDir, PipelineError> {
    if !pdf.is_file() {
        return Err(PipelineError::FileNotFound {
            path: pdf.to_path_buf(),
        });
    }
    let dir = new_temp_dir(root)?;
    debug!("Staged {} in {}", pdf.display(), dir.path().display());
    Ok(WorkDir {
        pdf: pdf.to_path_buf(),
        dir,
    })
}

/// Validate an uploaded file and write it into a fresh working directory.
pub async fn stage_upload(
    filename: &str,
    bytes: &[u8],
    root: Option<&Path>,
) -> Result<WorkDir, PipelineError> {
    if !has_pdf_extension(filename) {
        return Err(PipelineError::InvalidUpload(
            "Invalid file: please upload a PDF.".into(),
        ));
    }

    let name = match secure_filename(filename) {
        n if has_pdf_extension(&n) => n,
        _ => FALLBACK_NAME.to_string(),
    };
    let dir = new_temp_dir(root)?;
    let pdf = dir.path().join(&name);

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(PipelineError::NotAPdf { path: pdf, magic });
    }

    tokio::fs::write(&pdf, bytes)
        .await
        .map_err(|e| PipelineError::io(&pdf, e))?;
    debug!("Saved upload {} ({} bytes)", pdf.display(), bytes.len());
    Ok(WorkDir { pdf, dir })
}

/// `true` if the name ends in `.pdf`, in any case.
pub fn has_pdf_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied file name to something safe to put on disk.
///
/// Path separators become spaces, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`/`_` are
/// trimmed. `../../etc/passwd` becomes `etc_passwd`. May return an empty
/// string.
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    RE_UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_filename_strips_traversal() {
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("C:\\Users\\x\\scan 01.pdf"), "C_Users_x_scan_01.pdf");
        assert_eq!(secure_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn pdf_extension_check() {
        assert!(has_pdf_extension("a.pdf"));
        assert!(has_pdf_extension("A.PDF"));
        assert!(!has_pdf_extension("a.pdf.exe"));
        assert!(!has_pdf_extension("pdf"));
        assert!(!has_pdf_extension(""));
    }

    #[tokio::test]
    async fn upload_is_written_into_its_own_dir() {
        let root = tempfile::tempdir().unwrap();
        let staged = stage_upload("../scan 1.pdf", b"%PDF-1.7\n", Some(root.path()))
            .await
            .unwrap();
        assert_eq!(staged.pdf().file_name().unwrap(), "scan_1.pdf");
        assert!(staged.pdf().starts_with(root.path()));
        assert!(staged.pdf().is_file());

        let dir = staged.pdf().parent().unwrap().to_path_buf();
        drop(staged);
        assert!(!dir.exists(), "working directory must be removed on drop");
    }

    #[tokio::test]
    async fn wrong_extension_is_a_validation_error() {
        let err = stage_upload("photo.png", b"%PDF", None).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn wrong_magic_is_rejected() {
        let err = stage_upload("fake.pdf", b"GIF89a", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotAPdf { magic, .. } if &magic == b"GIF8"));
    }

    #[tokio::test]
    async fn unsanitisable_name_falls_back() {
        let staged = stage_upload("ñ.pdf", b"%PDF-1.4", None).await.unwrap();
        assert_eq!(staged.pdf().file_name().unwrap(), FALLBACK_NAME);
    }

    #[test]
    fn local_file_must_exist() {
        let err = stage_local(Path::new("/nope/missing.pdf"), None).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }
}
