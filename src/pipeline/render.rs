//! Region rasterisation: render the part of a page where an image is painted.
//!
//! ## Why render instead of dumping the bitmap?
//!
//! A PDF stores an image once and positions it with the current
//! transformation matrix. Scanners and signing tools love to store the bitmap
//! sideways or mirrored and fix it up with the CTM. Dumping the stored
//! bitmap then gives a picture that does not match the page; rendering the
//! placement box gives exactly what the operator sees.
//!
//! pdfium renders whole pages, so the page is rasterised once at the zoom
//! factor and each placement box is cropped out of the bitmap. The last page
//! rendered is cached because pages with a logo and a signature need it twice.

use crate::error::PipelineError;
use crate::pipeline::locate::{PageGeometry, PdfRect};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::cell::RefCell;
use std::path::Path;
use tracing::debug;

/// Turns a placement rectangle into pixels.
///
/// Implemented by [`PdfiumRasterizer`]; tests substitute a fake so the
/// extraction logic runs without a pdfium library.
pub trait RegionRasterizer {
    /// Render `rect` (user space) of the 0-based `page_index` at `zoom`.
    fn render_region(
        &self,
        page_index: usize,
        geometry: &PageGeometry,
        rect: &PdfRect,
        zoom: f32,
    ) -> Result<DynamicImage, String>;

    /// Why nothing can be rendered at all, when that is known up front.
    fn unavailable(&self) -> Option<&str> {
        None
    }
}

/// Bind to libpdfium: the explicit path if configured, otherwise the system library.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Stand-in used when libpdfium cannot be bound or refuses the document.
/// Every image then falls back to its stored bitmap.
#[derive(Debug, Clone)]
pub struct NoRenderer {
    reason: String,
}

impl NoRenderer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RegionRasterizer for NoRenderer {
    fn render_region(
        &self,
        _page_index: usize,
        _geometry: &PageGeometry,
        _rect: &PdfRect,
        _zoom: f32,
    ) -> Result<DynamicImage, String> {
        Err(self.reason.clone())
    }

    fn unavailable(&self) -> Option<&str> {
        Some(&self.reason)
    }
}

/// [`RegionRasterizer`] backed by a document opened in pdfium.
pub struct PdfiumRasterizer<'a, 'b> {
    document: &'a PdfDocument<'b>,
    alpha: bool,
    last_page: RefCell<Option<(usize, DynamicImage)>>,
}

impl<'a, 'b> PdfiumRasterizer<'a, 'b> {
    pub fn new(document: &'a PdfDocument<'b>, alpha: bool) -> Self {
        Self {
            document,
            alpha,
            last_page: RefCell::new(None),
        }
    }

    fn render_page(&self, page_index: usize, zoom: f32) -> Result<DynamicImage, String> {
        if let Some((idx, img)) = self.last_page.borrow().as_ref() {
            if *idx == page_index {
                return Ok(img.clone());
            }
        }

        let page = self
            .document
            .pages()
            .get(page_index as u16)
            .map_err(|e| format!("{e:?}"))?;
        let config = PdfRenderConfig::new().scale_page_by_factor(zoom);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| format!("{e:?}"))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {}x → {}x{} px",
            page_index + 1,
            zoom,
            image.width(),
            image.height()
        );

        *self.last_page.borrow_mut() = Some((page_index, image.clone()));
        Ok(image)
    }
}

impl RegionRasterizer for PdfiumRasterizer<'_, '_> {
    fn render_region(
        &self,
        page_index: usize,
        geometry: &PageGeometry,
        rect: &PdfRect,
        zoom: f32,
    ) -> Result<DynamicImage, String> {
        let page = self.render_page(page_index, zoom)?;
        let (x, y, w, h) = pixel_crop(geometry, rect, page.width(), page.height())
            .ok_or_else(|| "placement lies outside the visible page".to_string())?;
        let region = page.crop_imm(x, y, w, h);
        Ok(if self.alpha {
            DynamicImage::ImageRgba8(region.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(region.to_rgb8())
        })
    }
}

/// Map a user-space rectangle to a pixel box `(x, y, width, height)` inside
/// a rendered page of `pixel_w` × `pixel_h`.
///
/// The page is rendered as a viewer shows it: cropped to the visible box and
/// turned clockwise by `/Rotate`. The box is rounded outwards and clamped to
/// the bitmap; `None` means nothing of `rect` is visible.
pub fn pixel_crop(
    geometry: &PageGeometry,
    rect: &PdfRect,
    pixel_w: u32,
    pixel_h: u32,
) -> Option<(u32, u32, u32, u32)> {
    let vis = geometry.visible;
    let r = rect.intersect(&vis)?;
    let (w, h) = (vis.width(), vis.height());

    // Unrotated, top-left origin, y down.
    let (u0, u1) = (r.left - vis.left, r.right - vis.left);
    let (v0, v1) = (vis.top - r.top, vis.top - r.bottom);

    // (x0, x1, y0, y1, displayed width, displayed height) in points.
    let (x0, x1, y0, y1, dw, dh) = match geometry.rotate {
        90 => (h - v1, h - v0, u0, u1, h, w),
        180 => (w - u1, w - u0, h - v1, h - v0, w, h),
        270 => (v0, v1, w - u1, w - u0, h, w),
        _ => (u0, u1, v0, v1, w, h),
    };

    let sx = pixel_w as f64 / dw;
    let sy = pixel_h as f64 / dh;
    let px0 = (x0 * sx).floor().max(0.0) as u32;
    let py0 = (y0 * sy).floor().max(0.0) as u32;
    let px1 = ((x1 * sx).ceil() as u32).min(pixel_w);
    let py1 = ((y1 * sy).ceil() as u32).min(pixel_h);

    (px1 > px0 && py1 > py0).then(|| (px0, py0, px1 - px0, py1 - py0))
}
