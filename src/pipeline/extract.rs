//! Image extraction: one `image_<n>.png` per embedded image.
//!
//! For every image on every page, in order of preference:
//!
//! 1. the placement found through the image's page-level resource name,
//! 2. the first placement of the image's xref (the same image may be painted
//!    more than once, or only from inside a form XObject),
//! 3. the image stream itself, written as stored.
//!
//! Paths 1 and 2 render the placement box so rotation and mirroring applied
//! by the page come out right. Extraction is best effort per image: a
//! failure is logged, recorded in the report, and the next image is tried.
//! Only a document that cannot be opened aborts the run. Without pdfium every
//! image takes path 3, and placed ones are reported as not rendered.

use crate::config::PipelineConfig;
use crate::error::{ItemError, PipelineError};
use crate::output::{ExtractedImage, ExtractionMethod, ExtractionReport};
use crate::pipeline::locate::{self, ImageReference, PageImages, PdfRect};
use crate::pipeline::render::{bind_pdfium, NoRenderer, PdfiumRasterizer, RegionRasterizer};
use crate::progress::PipelineProgress;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, ObjectId};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stage 1 of the pipeline, behind a trait so the runner and the web layer
/// can be exercised with a stand-in extractor.
///
/// Implementations are blocking; the runner calls them from `spawn_blocking`.
pub trait ImageExtractor: Send + Sync {
    /// Write the document's images into `output_dir` and report what was written.
    fn extract(&self, pdf_path: &Path, output_dir: &Path) -> Result<ExtractionReport, PipelineError>;
}

/// The production extractor: lopdf for discovery, pdfium for rendering.
pub struct PdfImageExtractor {
    zoom: f32,
    render_alpha: bool,
    pdfium_library: Option<PathBuf>,
    progress: Option<crate::progress::ProgressCallback>,
}

impl Default for PdfImageExtractor {
    fn default() -> Self {
        Self {
            zoom: 2.0,
            render_alpha: false,
            pdfium_library: None,
            progress: None,
        }
    }
}

impl PdfImageExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            zoom: config.zoom,
            render_alpha: config.render_alpha,
            pdfium_library: config.pdfium_library.clone(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Render zoom, clamped to 0.5–8.0 like [`PipelineConfig::zoom`].
    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom.clamp(0.5, 8.0);
        self
    }

    pub fn with_pdfium_library(mut self, path: Option<PathBuf>) -> Self {
        self.pdfium_library = path;
        self
    }
}

impl ImageExtractor for PdfImageExtractor {
    fn extract(&self, pdf_path: &Path, output_dir: &Path) -> Result<ExtractionReport, PipelineError> {
        info!("Extracting images from {}", pdf_path.display());
        let doc = open_document(pdf_path)?;

        let pdfium = bind_pdfium(self.pdfium_library.as_deref());
        let rendered = match &pdfium {
            Ok(pdfium) => pdfium
                .load_pdf_from_file(pdf_path, None)
                .map_err(|e| format!("pdfium could not open the document: {e:?}")),
            Err(e) => Err(e.to_string()),
        };

        let progress = self.progress.as_deref();
        match &rendered {
            Ok(document) => {
                let rasterizer = PdfiumRasterizer::new(document, self.render_alpha);
                extract_with(&doc, &rasterizer, output_dir, self.zoom, progress)
            }
            Err(reason) => {
                warn!("Rendering unavailable, writing stored bitmaps: {}", reason);
                extract_with(&doc, &NoRenderer::new(reason.as_str()), output_dir, self.zoom, progress)
            }
        }
    }
}

/// Open a PDF with lopdf after checking that it exists and looks like a PDF.
pub fn open_document(path: &Path) -> Result<Document, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map_err(|e| PipelineError::io(path, e))?;
    if &magic != b"%PDF" {
        return Err(PipelineError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    Document::load(path).map_err(|e| PipelineError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Run the extraction over an already-opened document.
///
/// Returns the report of written images; the count is `report.count()`.
pub fn extract_with(
    doc: &Document,
    rasterizer: &dyn RegionRasterizer,
    output_dir: &Path,
    zoom: f32,
    progress: Option<&dyn PipelineProgress>,
) -> Result<ExtractionReport, PipelineError> {
    std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;

    let mut report = ExtractionReport::default();

    for page in locate::scan_document(doc) {
        debug!("Page {}: {} images", page.page, page.references.len());

        for reference in &page.references {
            let index = report.count() + 1;
            let path = output_dir.join(format!("image_{index}.png"));

            let placement = find_placement(&page, reference);
            let unrendered = placement.as_ref().and(rasterizer.unavailable());
            let placement = if unrendered.is_some() { None } else { placement };

            match extract_one(doc, rasterizer, &page, reference, placement, &path, zoom) {
                Ok(method) => {
                    debug!("  → {} ({:?})", path.display(), method);
                    if let Some(reason) = unrendered {
                        report.failures.push(ItemError::RenderUnavailable {
                            page: page.page,
                            xref: reference.xref.0,
                            detail: reason.to_string(),
                        });
                    }
                    if let Some(cb) = progress {
                        cb.on_image_extracted(index, page.page, method);
                    }
                    report.images.push(ExtractedImage {
                        index,
                        page: page.page,
                        xref: reference.xref.0,
                        path,
                        method,
                    });
                }
                Err(detail) => {
                    warn!(
                        "Page {}, xref {}: skipped: {}",
                        page.page, reference.xref.0, detail
                    );
                    report.failures.push(ItemError::ExtractFailed {
                        page: page.page,
                        xref: reference.xref.0,
                        detail,
                    });
                }
            }
        }
    }

    info!("Extracted {} images", report.count());
    Ok(report)
}

/// Write one image to `path`: render `placement` if there is one, otherwise
/// copy the stored bitmap.
fn extract_one(
    doc: &Document,
    rasterizer: &dyn RegionRasterizer,
    page: &PageImages,
    reference: &ImageReference,
    placement: Option<(PdfRect, ExtractionMethod)>,
    path: &Path,
    zoom: f32,
) -> Result<ExtractionMethod, String> {
    if let Some((rect, method)) = placement {
        let image = rasterizer.render_region(page.page - 1, &page.geometry, &rect, zoom)?;
        image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        return Ok(method);
    }

    let bytes = raw_image_bytes(doc, reference.xref)?;
    std::fs::write(path, bytes).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(ExtractionMethod::RawBytes)
}

/// Preferred path by name, then the first placement of the xref.
pub fn find_placement(
    page: &PageImages,
    reference: &ImageReference,
) -> Option<(PdfRect, ExtractionMethod)> {
    if let Some(name) = &reference.name {
        match page.placement_by_name(name) {
            Some(rect) if !rect.is_empty() => {
                return Some((rect, ExtractionMethod::NamedPlacement))
            }
            _ => debug!(
                "Page {}: no usable placement for name {} (xref {})",
                page.page, name, reference.xref.0
            ),
        }
    }

    page.placements_for_xref(reference.xref)
        .into_iter()
        .next()
        .filter(|rect| !rect.is_empty())
        .map(|rect| (rect, ExtractionMethod::XrefPlacement))
}

/// The image as stored in the document.
///
/// JPEG and JPEG 2000 streams are returned untouched. Other streams are
/// decoded and, when they hold 8-bit gray, RGB or CMYK samples, PNG-encoded;
/// anything else has no extractable data.
pub fn raw_image_bytes(doc: &Document, xref: ObjectId) -> Result<Vec<u8>, String> {
    let stream = doc
        .get_object(xref)
        .and_then(Object::as_stream)
        .map_err(|e| format!("image object unavailable: {e}"))?;

    let filters = stream_filters(&stream.dict);
    if matches!(filters.as_slice(), [f] if f == "DCTDecode" || f == "JPXDecode") {
        return Ok(stream.content.clone());
    }

    let width = dict_u32(&stream.dict, b"Width").ok_or("image has no /Width")?;
    let height = dict_u32(&stream.dict, b"Height").ok_or("image has no /Height")?;
    let bpc = dict_u32(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return Err(format!("no extractable data ({bpc} bits per component)"));
    }
    let components = color_components(doc, &stream.dict)
        .ok_or("no extractable data (unsupported colour space)")?;

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| format!("no extractable data ({e})"))?
    };

    let image = pixels_to_image(width, height, components, samples)?;
    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;
    Ok(png)
}

fn pixels_to_image(
    width: u32,
    height: u32,
    components: u8,
    samples: Vec<u8>,
) -> Result<DynamicImage, String> {
    let expected = width as usize * height as usize * components as usize;
    if samples.len() < expected {
        return Err(format!(
            "truncated image data: {} bytes, expected {expected}",
            samples.len()
        ));
    }
    let mut samples = samples;
    samples.truncate(expected);

    let image = match components {
        1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        4 => {
            let rgb: Vec<u8> = samples
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u16;
                    [
                        ((255 - p[0] as u16) * k / 255) as u8,
                        ((255 - p[1] as u16) * k / 255) as u8,
                        ((255 - p[2] as u16) * k / 255) as u8,
                    ]
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        n => return Err(format!("no extractable data ({n} colour components)")),
    };
    image.ok_or_else(|| "image buffer size mismatch".to_string())
}

fn stream_filters(dict: &lopdf::Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_u32(dict: &lopdf::Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()
        .and_then(|o| o.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
}

/// Samples per pixel for the device colour spaces and ICC-based spaces.
fn color_components(doc: &Document, dict: &lopdf::Dictionary) -> Option<u8> {
    let cs = locate::resolve(doc, dict.get(b"ColorSpace").ok()?)?;
    match cs {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(arr) => {
            let family = arr.first()?.as_name().ok()?;
            match family {
                b"ICCBased" => {
                    let profile = locate::resolve(doc, arr.get(1)?)?.as_stream().ok()?;
                    profile
                        .dict
                        .get(b"N")
                        .ok()
                        .and_then(|o| o.as_i64().ok())
                        .and_then(|n| u8::try_from(n).ok())
                }
                b"CalRGB" => Some(3),
                b"CalGray" => Some(1),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_samples_become_png() {
        let img = pixels_to_image(2, 2, 1, vec![0, 64, 128, 255]).unwrap();
        assert_eq!((img.width(), img.height()), (2, 2));
    }

    #[test]
    fn cmyk_samples_are_converted() {
        // Pure cyan → (0, 255, 255).
        let img = pixels_to_image(1, 1, 4, vec![255, 0, 0, 0]).unwrap();
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [0, 255, 255]);
    }

    #[test]
    fn truncated_samples_are_rejected() {
        let err = pixels_to_image(4, 4, 3, vec![0; 10]).unwrap_err();
        assert!(err.contains("truncated"), "got: {err}");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = open_document(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04 zip archive").unwrap();
        let err = open_document(&path).unwrap_err();
        assert!(matches!(err, PipelineError::NotAPdf { .. }));
        assert!(err.is_validation());
    }
}
