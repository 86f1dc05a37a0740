//! Result types produced by each pipeline stage and by a whole submission.

use crate::error::{ItemError, PipelineError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How an image made it to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Page region rendered from the placement found by resource name.
    NamedPlacement,
    /// Page region rendered from the first placement of the image's xref.
    XrefPlacement,
    /// No placement found; the image stream was written as stored.
    /// Orientation may not match what the page shows.
    RawBytes,
}

impl ExtractionMethod {
    pub fn is_rendered(self) -> bool {
        !matches!(self, ExtractionMethod::RawBytes)
    }
}

/// One `image_<n>.png` written by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// 1-based, document-wide counter used in the file name.
    pub index: usize,
    /// 1-based page number the image was found on.
    pub page: usize,
    /// Object number of the image XObject.
    pub xref: u32,
    pub path: PathBuf,
    pub method: ExtractionMethod,
}

/// Everything the extractor produced for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub images: Vec<ExtractedImage>,
    pub failures: Vec<ItemError>,
}

impl ExtractionReport {
    /// Total count of images successfully written.
    pub fn count(&self) -> usize {
        self.images.len()
    }
}

/// A file that is now on Drive and readable by anyone with the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    /// Display name on Drive (the local file name).
    pub name: String,
    /// Public view URL built from `id`.
    pub url: String,
    /// Drive file id.
    pub id: String,
}

/// Uploader output.
///
/// Each [`UploadedImage`] carries its own name, URL and id, so the three
/// "parallel lists" the sheet expects can never drift out of alignment;
/// [`UploadBatch::into_parallel`] and [`UploadBatch::from_parallel`] convert
/// at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub uploaded: Vec<UploadedImage>,
    pub failures: Vec<ItemError>,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.uploaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.uploaded.iter().map(|u| u.url.as_str()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.uploaded.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.uploaded.iter().map(|u| u.id.as_str()).collect()
    }

    /// Split into `(urls, names, ids)`.
    pub fn into_parallel(self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut urls = Vec::with_capacity(self.uploaded.len());
        let mut names = Vec::with_capacity(self.uploaded.len());
        let mut ids = Vec::with_capacity(self.uploaded.len());
        for u in self.uploaded {
            urls.push(u.url);
            names.push(u.name);
            ids.push(u.id);
        }
        (urls, names, ids)
    }

    /// Zip three positionally aligned lists back together.
    ///
    /// Lists of different lengths cannot describe the same objects and are
    /// rejected.
    pub fn from_parallel(
        urls: Vec<String>,
        names: Vec<String>,
        ids: Vec<String>,
    ) -> Result<Self, PipelineError> {
        if urls.len() != names.len() || names.len() != ids.len() {
            return Err(PipelineError::Internal(format!(
                "misaligned upload lists: {} urls, {} names, {} ids",
                urls.len(),
                names.len(),
                ids.len()
            )));
        }
        let uploaded = urls
            .into_iter()
            .zip(names)
            .zip(ids)
            .map(|((url, name), id)| UploadedImage { name, url, id })
            .collect();
        Ok(Self {
            uploaded,
            failures: Vec::new(),
        })
    }
}

/// What the sheet updater wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetUpdateReport {
    pub worksheet: String,
    /// First row written (1-based), i.e. the first empty row of column A.
    pub start_row: u32,
    pub rows_written: usize,
    /// Entries dropped for having an empty name or URL.
    pub rows_skipped: usize,
    /// Attempts used, including those answered with HTTP 429.
    pub attempts: u32,
}

impl SheetUpdateReport {
    /// Last row written, if any row was written.
    pub fn end_row(&self) -> Option<u32> {
        (self.rows_written > 0).then(|| self.start_row + self.rows_written as u32 - 1)
    }
}

/// Overall verdict for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Every extracted image was uploaded and the sheet was updated.
    Complete,
    /// The sheet was updated, but some images or uploads were lost.
    Partial { failures: Vec<ItemError> },
    /// Nothing usable reached the sheet.
    Failed { reason: String },
}

/// Full account of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub worksheet: String,
    pub extraction: ExtractionReport,
    pub uploads: UploadBatch,
    pub sheet: Option<SheetUpdateReport>,
    /// Why the sheet update was abandoned, when it was.
    pub sheet_error: Option<String>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn outcome(&self) -> Outcome {
        if let Some(reason) = &self.sheet_error {
            return Outcome::Failed {
                reason: reason.clone(),
            };
        }

        let failures: Vec<ItemError> = self
            .extraction
            .failures
            .iter()
            .chain(self.uploads.failures.iter())
            .cloned()
            .collect();

        if self.uploads.is_empty() && !failures.is_empty() {
            return Outcome::Failed {
                reason: format!(
                    "no image could be published ({} failures); first: {}",
                    failures.len(),
                    failures[0]
                ),
            };
        }

        if failures.is_empty() {
            Outcome::Complete
        } else {
            Outcome::Partial { failures }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome() == Outcome::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded(n: usize) -> UploadedImage {
        UploadedImage {
            name: format!("image_{n}.png"),
            url: format!("https://drive.google.com/uc?export=view&id=id{n}"),
            id: format!("id{n}"),
        }
    }

    fn report(uploads: UploadBatch, sheet_error: Option<String>) -> PipelineReport {
        PipelineReport {
            worksheet: "bulco".into(),
            extraction: ExtractionReport::default(),
            uploads,
            sheet: None,
            sheet_error,
            duration_ms: 0,
        }
    }

    #[test]
    fn parallel_lists_stay_aligned() {
        let batch = UploadBatch {
            uploaded: vec![uploaded(1), uploaded(2)],
            failures: vec![],
        };
        assert_eq!(batch.names(), vec!["image_1.png", "image_2.png"]);
        assert_eq!(batch.ids(), vec!["id1", "id2"]);
        let (urls, names, ids) = batch.clone().into_parallel();
        let back = UploadBatch::from_parallel(urls, names, ids).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn misaligned_lists_are_rejected() {
        let err = UploadBatch::from_parallel(
            vec!["u1".into(), "u2".into()],
            vec!["n1".into()],
            vec!["i1".into(), "i2".into()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("misaligned"));
    }

    #[test]
    fn end_row_of_sheet_report() {
        let mut r = SheetUpdateReport {
            worksheet: "bulco".into(),
            start_row: 5,
            rows_written: 3,
            rows_skipped: 0,
            attempts: 1,
        };
        assert_eq!(r.end_row(), Some(7));
        r.rows_written = 0;
        assert_eq!(r.end_row(), None);
    }

    #[test]
    fn outcome_complete_partial_failed() {
        let ok = UploadBatch {
            uploaded: vec![uploaded(1)],
            failures: vec![],
        };
        assert_eq!(report(ok.clone(), None).outcome(), Outcome::Complete);

        let lost = ItemError::UploadFailed {
            file: "image_2.png".into(),
            attempts: 3,
            detail: "HTTP 500".into(),
        };
        let partial = UploadBatch {
            uploaded: vec![uploaded(1)],
            failures: vec![lost.clone()],
        };
        assert_eq!(
            report(partial, None).outcome(),
            Outcome::Partial {
                failures: vec![lost.clone()]
            }
        );

        let none = UploadBatch {
            uploaded: vec![],
            failures: vec![lost],
        };
        assert!(matches!(report(none, None).outcome(), Outcome::Failed { .. }));

        let sheet_failed = report(ok, Some("HTTP 404".into()));
        assert_eq!(
            sheet_failed.outcome(),
            Outcome::Failed {
                reason: "HTTP 404".into()
            }
        );
    }

    #[test]
    fn empty_document_is_complete() {
        assert!(report(UploadBatch::default(), None).is_complete());
    }
}
