//! Image discovery: which image XObjects a page uses, and where it draws them.
//!
//! pdfium renders pages but hides object numbers and resource names, so this
//! stage walks the document with lopdf instead:
//!
//! 1. Resolve the page's (possibly inherited) `/Resources /XObject` entries
//!    and every form XObject drawn from them → one [`ImageReference`] per
//!    image xref.
//! 2. Interpret the content stream (`q` / `Q` / `cm` / `Do`) to record every
//!    [`Placement`]: the axis-aligned box of the unit square under the CTM
//!    in force when the image is painted. Rotation and mirroring baked into
//!    the CTM therefore end up in the box, and rendering that box reproduces
//!    the image the way the page shows it.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

/// Form XObjects may nest; anything deeper than this is ignored.
const MAX_FORM_DEPTH: usize = 8;

/// Parent chains longer than this are treated as malformed.
const MAX_INHERIT_DEPTH: usize = 32;

/// Rectangle in PDF user space (origin bottom-left, y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl PdfRect {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// A rectangle without area cannot be rendered.
    pub fn is_empty(&self) -> bool {
        self.width() < f64::EPSILON || self.height() < f64::EPSILON
    }

    pub fn intersect(&self, other: &PdfRect) -> Option<PdfRect> {
        let r = PdfRect {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        };
        (r.left < r.right && r.bottom < r.top).then_some(r)
    }

    fn from_array(obj: &Object) -> Option<PdfRect> {
        let arr = obj.as_array().ok()?;
        if arr.len() != 4 {
            return None;
        }
        let v: Vec<f64> = arr.iter().filter_map(number).collect();
        (v.len() == 4).then(|| PdfRect::new(v[0], v[1], v[2], v[3]))
    }
}

/// Affine transform `[a b c d e f]` as written in a `cm` operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// `self` applied first, then `outer`.
    pub fn then(&self, outer: &Matrix) -> Matrix {
        Matrix {
            a: self.a * outer.a + self.b * outer.c,
            b: self.a * outer.b + self.b * outer.d,
            c: self.c * outer.a + self.d * outer.c,
            d: self.c * outer.b + self.d * outer.d,
            e: self.e * outer.a + self.f * outer.c + outer.e,
            f: self.e * outer.b + self.f * outer.d + outer.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of the unit square, i.e. of an image painted under `self`.
    pub fn unit_square_bounds(&self) -> PdfRect {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        PdfRect::new(x0, y0, x1, y1)
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() != 6 {
            return None;
        }
        let v: Vec<f64> = operands.iter().filter_map(number).collect();
        (v.len() == 6).then(|| Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5]))
    }
}

/// The visible area of a page and how the viewer turns it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// CropBox if present, otherwise MediaBox.
    pub visible: PdfRect,
    /// `/Rotate`, normalised to 0, 90, 180 or 270.
    pub rotate: u16,
}

impl Default for PageGeometry {
    fn default() -> Self {
        // US Letter, the PDF default when MediaBox is missing.
        Self {
            visible: PdfRect::new(0.0, 0.0, 612.0, 792.0),
            rotate: 0,
        }
    }
}

/// One embedded raster image used by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// 1-based page number.
    pub page: usize,
    /// Object id of the image XObject.
    pub xref: ObjectId,
    /// Resource name under which the page itself paints the image. `None`
    /// when the image only appears inside a form XObject.
    pub name: Option<String>,
}

/// One painting of an image on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub xref: ObjectId,
    /// Resource name used by the `Do` operator.
    pub name: String,
    /// `true` if the `Do` was executed inside a form XObject, where the name
    /// belongs to the form's resources rather than the page's.
    pub in_form: bool,
    pub rect: PdfRect,
}

/// Everything the extractor needs to know about a page's images.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImages {
    /// 1-based page number.
    pub page: usize,
    pub geometry: PageGeometry,
    pub references: Vec<ImageReference>,
    pub placements: Vec<Placement>,
}

impl PageImages {
    /// Placement of the image painted by the page under resource `name`.
    pub fn placement_by_name(&self, name: &str) -> Option<PdfRect> {
        self.placements
            .iter()
            .find(|p| !p.in_form && p.name == name)
            .map(|p| p.rect)
    }

    /// Every placement of `xref` on the page, in painting order.
    pub fn placements_for_xref(&self, xref: ObjectId) -> Vec<PdfRect> {
        self.placements
            .iter()
            .filter(|p| p.xref == xref)
            .map(|p| p.rect)
            .collect()
    }
}

/// Scan every page of the document, in page order.
pub fn scan_document(doc: &Document) -> Vec<PageImages> {
    doc.get_pages()
        .into_iter()
        .map(|(page_no, page_id)| scan_page(doc, page_no as usize, page_id))
        .collect()
}

/// Collect the image references and placements of one page.
///
/// Never fails: a content stream that cannot be decoded just yields no
/// placements, which sends the extractor down its raw-bytes path.
pub fn scan_page(doc: &Document, page: usize, page_id: ObjectId) -> PageImages {
    let geometry = page_geometry(doc, page_id);
    let resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok());

    let mut references = Vec::new();
    if let Some(res) = resources {
        collect_references(doc, res, page, true, 0, &mut references);
    }

    let mut placements = Vec::new();
    match doc.get_page_content(page_id) {
        Ok(bytes) => match Content::decode(&bytes) {
            Ok(content) => {
                if let Some(res) = resources {
                    walk_content(
                        doc,
                        &content,
                        res,
                        Matrix::IDENTITY,
                        false,
                        0,
                        &mut placements,
                    );
                }
            }
            Err(e) => warn!("Page {}: content stream not decodable: {}", page, e),
        },
        Err(e) => warn!("Page {}: content stream unavailable: {}", page, e),
    }

    debug!(
        "Page {}: {} image references, {} placements",
        page,
        references.len(),
        placements.len()
    );

    PageImages {
        page,
        geometry,
        references,
        placements,
    }
}

/// Record image XObjects reachable from `resources`, descending into forms.
fn collect_references(
    doc: &Document,
    resources: &Dictionary,
    page: usize,
    page_level: bool,
    depth: usize,
    out: &mut Vec<ImageReference>,
) {
    if depth > MAX_FORM_DEPTH {
        return;
    }
    let Some(xobjects) = xobject_dict(doc, resources) else {
        return;
    };

    for (name, obj) in xobjects.iter() {
        let Ok(id) = obj.as_reference() else {
            continue;
        };
        let Some(stream) = doc.get_object(id).ok().and_then(|o| o.as_stream().ok()) else {
            continue;
        };
        let name = String::from_utf8_lossy(name).into_owned();

        match subtype(&stream.dict).as_deref() {
            Some("Image") => {
                if let Some(existing) = out.iter_mut().find(|r| r.xref == id) {
                    // Same image also reachable under a page-level name.
                    if page_level && existing.name.is_none() {
                        existing.name = Some(name);
                    }
                } else {
                    out.push(ImageReference {
                        page,
                        xref: id,
                        name: page_level.then_some(name),
                    });
                }
            }
            Some("Form") => {
                if let Some(form_res) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve(doc, o))
                    .and_then(|o| o.as_dict().ok())
                {
                    collect_references(doc, form_res, page, false, depth + 1, out);
                }
            }
            _ => {}
        }
    }
}

/// Interpret graphics-state operators and record every image painting.
fn walk_content(
    doc: &Document,
    content: &Content,
    resources: &Dictionary,
    base: Matrix,
    in_form: bool,
    depth: usize,
    out: &mut Vec<Placement>,
) {
    let mut ctm = base;
    let mut stack: Vec<Matrix> = Vec::new();

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => {
                if let Some(saved) = stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    ctm = m.then(&ctm);
                }
            }
            "Do" => {
                let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                let Some(id) = xobject_dict(doc, resources)
                    .and_then(|x| x.get(name).ok())
                    .and_then(|o| o.as_reference().ok())
                else {
                    continue;
                };
                let Some(stream) = doc.get_object(id).ok().and_then(|o| o.as_stream().ok())
                else {
                    continue;
                };

                match subtype(&stream.dict).as_deref() {
                    Some("Image") => out.push(Placement {
                        xref: id,
                        name: String::from_utf8_lossy(name).into_owned(),
                        in_form,
                        rect: ctm.unit_square_bounds(),
                    }),
                    Some("Form") if depth < MAX_FORM_DEPTH => {
                        let form_matrix = stream
                            .dict
                            .get(b"Matrix")
                            .ok()
                            .and_then(|o| o.as_array().ok())
                            .and_then(|a| Matrix::from_operands(a))
                            .unwrap_or(Matrix::IDENTITY);
                        let form_res = stream
                            .dict
                            .get(b"Resources")
                            .ok()
                            .and_then(|o| resolve(doc, o))
                            .and_then(|o| o.as_dict().ok())
                            .unwrap_or(resources);
                        let bytes = stream
                            .decompressed_content()
                            .unwrap_or_else(|_| stream.content.clone());
                        match Content::decode(&bytes) {
                            Ok(inner) => walk_content(
                                doc,
                                &inner,
                                form_res,
                                form_matrix.then(&ctm),
                                true,
                                depth + 1,
                                out,
                            ),
                            Err(e) => debug!("Form xobject {:?}: undecodable content: {}", id, e),
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

/// Crop box / media box and rotation, honouring inheritance.
pub fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let boxed = |key: &[u8]| {
        inherited(doc, page_id, key)
            .and_then(|o| resolve(doc, o))
            .and_then(PdfRect::from_array)
    };
    let media = boxed(b"MediaBox").unwrap_or(PageGeometry::default().visible);
    let visible = boxed(b"CropBox")
        .and_then(|crop| crop.intersect(&media))
        .unwrap_or(media);

    let rotate = inherited(doc, page_id, b"Rotate")
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0)
        .rem_euclid(360);
    // Only quarter turns are legal; round anything else to the nearest one.
    let rotate = (((rotate + 45) / 90) * 90 % 360) as u16;

    PageGeometry { visible, rotate }
}

/// Look up an inheritable page attribute, walking `/Parent` links.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn xobject_dict<'a>(doc: &'a Document, resources: &'a Dictionary) -> Option<&'a Dictionary> {
    resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
}

fn subtype(dict: &Dictionary) -> Option<String> {
    dict.get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

/// Follow one level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}
