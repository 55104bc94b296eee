//! Document model: the parsed PDF and its page descriptors
//!
//! Geometry comes from each page's visible box: the CropBox clipped to the
//! MediaBox, both resolved through the page tree. That is the area the
//! browser renderer rasterizes, and the export step uses the same box for its
//! Y flip. Rasterization is not done here; the platform renderer draws pages
//! from the same bytes.

use crate::error::ViewerError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use tracing::{debug, info, warn};

/// US Letter, used when a page carries no usable MediaBox
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against cyclic `Parent` chains in malformed files
const MAX_TREE_DEPTH: usize = 32;

/// Page dimensions at some scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub const ZERO: Viewport = Viewport {
        width: 0.0,
        height: 0.0,
    };

    pub fn scaled(&self, scale: f64) -> Viewport {
        Viewport {
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageDescriptor {
    page_number: u32,
    page_id: ObjectId,
    /// Visible box lower-left corner in output space
    origin: (f64, f64),
    base: Viewport,
}

impl PageDescriptor {
    /// 1-based page number
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_id(&self) -> ObjectId {
        self.page_id
    }

    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Size at scale 1.0
    pub fn base_viewport(&self) -> Viewport {
        self.base
    }

    pub fn viewport(&self, scale: f64) -> Viewport {
        self.base.scaled(scale)
    }
}

/// Summary shown to the user after a successful load
#[derive(Debug, Clone, Serialize, Default)]
pub struct DocumentInfo {
    pub page_count: u32,
    /// PDF version string (e.g., "1.7")
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    pub title: Option<String>,
}

/// A loaded PDF. Owned by the session and dropped on reload.
pub struct PdfDocument {
    document: Document,
    pages: Vec<PageDescriptor>,
    info: DocumentInfo,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("pages", &self.pages.len())
            .field("info", &self.info)
            .finish()
    }
}

impl PdfDocument {
    /// Parse PDF bytes and build the page descriptors
    pub fn load(bytes: &[u8]) -> Result<Self, ViewerError> {
        if bytes.len() < 8 {
            return Err(ViewerError::Load(
                "File too small to be a valid PDF".to_string(),
            ));
        }
        if !bytes.starts_with(b"%PDF-") {
            return Err(ViewerError::Load(
                "Not a valid PDF file (missing %PDF- header)".to_string(),
            ));
        }

        let document =
            Document::load_mem(bytes).map_err(|e| ViewerError::Load(e.to_string()))?;

        let page_ids = document.get_pages();
        if page_ids.is_empty() {
            return Err(ViewerError::Load("PDF has no pages".to_string()));
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for (page_number, page_id) in page_ids {
            let [x, y, width, height] = page_box(&document, page_id);
            pages.push(PageDescriptor {
                page_number,
                page_id,
                origin: (x, y),
                base: Viewport { width, height },
            });
        }

        let info = DocumentInfo {
            page_count: pages.len() as u32,
            version: extract_version(bytes),
            encrypted: document.is_encrypted(),
            size_bytes: bytes.len(),
            title: extract_title(&document),
        };

        info!(
            pages = info.page_count,
            version = %info.version,
            encrypted = info.encrypted,
            "loaded PDF document"
        );

        Ok(Self {
            document,
            pages,
            info,
        })
    }

    /// Release the document. Surfaces derived from it must already be freed.
    pub fn unload(self) {
        debug!(pages = self.pages.len(), "unloading PDF document");
        drop(self);
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn get_page(&self, page_number: u32) -> Result<&PageDescriptor, ViewerError> {
        if page_number == 0 {
            return Err(self.out_of_range(page_number));
        }
        self.pages
            .get(page_number as usize - 1)
            .ok_or_else(|| self.out_of_range(page_number))
    }

    pub fn get_viewport(&self, page_number: u32, scale: f64) -> Result<Viewport, ViewerError> {
        Ok(self.get_page(page_number)?.viewport(scale))
    }

    pub fn inner(&self) -> &Document {
        &self.document
    }

    fn out_of_range(&self, page: u32) -> ViewerError {
        ViewerError::OutOfRange {
            page,
            page_count: self.page_count(),
        }
    }
}

/// Resolve a page's MediaBox as [x, y, width, height], walking up the page
/// tree for the inherited attribute
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    match inherited_rect(doc, page_id, b"MediaBox") {
        Some(Some(rect)) => rect,
        Some(None) => {
            warn!(?page_id, "unparsable MediaBox, using US Letter");
            DEFAULT_MEDIA_BOX
        }
        None => DEFAULT_MEDIA_BOX,
    }
}

/// The visible page area as [x, y, width, height]: the CropBox clipped to
/// the MediaBox, or the MediaBox when there is no usable CropBox
pub(crate) fn page_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let media = media_box(doc, page_id);
    match inherited_rect(doc, page_id, b"CropBox") {
        Some(Some(crop)) => intersect(media, crop).unwrap_or_else(|| {
            warn!(?page_id, "CropBox lies outside the MediaBox, using MediaBox");
            media
        }),
        Some(None) => {
            warn!(?page_id, "unparsable CropBox, using MediaBox");
            media
        }
        None => media,
    }
}

/// Look up an inheritable rectangle. The outer `None` means no dictionary in
/// the chain has `key`; `Some(None)` means the nearest one is malformed.
fn inherited_rect(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Option<[f64; 4]>> {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;

    while let Some(dict) = current {
        if let Ok(obj) = dict.get(key) {
            return Some(parse_rect(doc, obj));
        }

        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        current = parent_of(doc, dict);
    }

    None
}

fn intersect(a: [f64; 4], b: [f64; 4]) -> Option<[f64; 4]> {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    (x2 > x1 && y2 > y1).then_some([x1, y1, x2 - x1, y2 - y1])
}

fn parent_of<'a>(doc: &'a Document, dict: &Dictionary) -> Option<&'a Dictionary> {
    let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    doc.get_dictionary(parent_id).ok()
}

/// Parse a PDF rectangle array into [x, y, width, height]
fn parse_rect(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let arr = match obj {
        Object::Array(a) => a,
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        _ => return None,
    };
    if arr.len() != 4 {
        return None;
    }

    let mut values = [0.0f64; 4];
    for (slot, item) in values.iter_mut().zip(arr) {
        *slot = extract_number(doc, item)?;
    }

    // Normalize in case the corners are given in reverse order
    let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
    let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
    if x2 - x1 <= 0.0 || y2 - y1 <= 0.0 {
        return None;
    }

    Some([x1, y1, x2 - x1, y2 - y1])
}

fn extract_number(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        },
        _ => None,
    }
}

/// Extract PDF version from header
fn extract_version(bytes: &[u8]) -> String {
    // Header format: %PDF-1.7
    if bytes.len() >= 8 && bytes.starts_with(b"%PDF-") {
        if let Ok(version) = std::str::from_utf8(&bytes[5..8]) {
            return version.trim().to_string();
        }
    }
    "1.4".to_string()
}

fn extract_title(document: &Document) -> Option<String> {
    let info_id = document.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = document.get_dictionary(info_id).ok()?;
    let title = info.get(b"Title").ok()?.as_str().ok()?;
    let decoded = String::from_utf8_lossy(title).into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    // Page 1: US Letter on the page itself, page 2: A4 inherited from the tree
    fn create_test_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");

        let pages_id = doc.new_object_id();
        let page1_id = doc.new_object_id();
        let page2_id = doc.new_object_id();

        doc.objects.insert(
            page1_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        doc.objects.insert(
            page2_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page1_id.into(), page2_id.into()],
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_load_builds_descriptors_in_order() {
        let doc = PdfDocument::load(&create_test_pdf()).unwrap();
        assert_eq!(doc.page_count(), 2);

        let numbers: Vec<u32> = doc.pages().iter().map(|p| p.page_number()).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(doc.info().version, "1.5");
        assert!(!doc.info().encrypted);
    }

    #[test]
    fn test_media_box_is_inherited_from_page_tree() {
        let doc = PdfDocument::load(&create_test_pdf()).unwrap();

        let page1 = doc.get_page(1).unwrap().base_viewport();
        assert_eq!(page1, Viewport { width: 612.0, height: 792.0 });

        let page2 = doc.get_page(2).unwrap().base_viewport();
        assert_eq!(page2, Viewport { width: 595.0, height: 842.0 });
    }

    fn create_cropped_pdf(crop: Vec<Object>) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "CropBox" => crop,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_inherited_crop_box_defines_visible_area() {
        let pdf = create_cropped_pdf(vec![36.into(), 36.into(), 576.into(), 756.into()]);
        let doc = PdfDocument::load(&pdf).unwrap();
        let page = doc.get_page(1).unwrap();
        assert_eq!(page.base_viewport(), Viewport { width: 540.0, height: 720.0 });
        assert_eq!(page.origin(), (36.0, 36.0));
    }

    #[test]
    fn test_crop_box_is_clipped_to_media_box() {
        let pdf = create_cropped_pdf(vec![(-50).into(), 100.into(), 700.into(), 900.into()]);
        let doc = PdfDocument::load(&pdf).unwrap();
        let page = doc.get_page(1).unwrap();
        assert_eq!(page.base_viewport(), Viewport { width: 612.0, height: 692.0 });
        assert_eq!(page.origin(), (0.0, 100.0));
    }

    #[test]
    fn test_crop_box_outside_media_box_is_ignored() {
        let pdf = create_cropped_pdf(vec![700.into(), 800.into(), 900.into(), 1000.into()]);
        let doc = PdfDocument::load(&pdf).unwrap();
        assert_eq!(
            doc.get_page(1).unwrap().base_viewport(),
            Viewport { width: 612.0, height: 792.0 }
        );
    }

    #[test]
    fn test_get_page_out_of_range() {
        let doc = PdfDocument::load(&create_test_pdf()).unwrap();

        for page in [0, 3, 100] {
            match doc.get_page(page) {
                Err(ViewerError::OutOfRange { page: p, page_count }) => {
                    assert_eq!(p, page);
                    assert_eq!(page_count, 2);
                }
                other => panic!("expected OutOfRange, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_viewport_scales_deterministically() {
        let doc = PdfDocument::load(&create_test_pdf()).unwrap();
        let vp = doc.get_viewport(1, 1.5).unwrap();
        assert_eq!(vp.width, 918.0);
        assert_eq!(vp.height, 1188.0);
        assert_eq!(doc.get_viewport(1, 1.5).unwrap(), vp);
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            PdfDocument::load(b"hello"),
            Err(ViewerError::Load(_))
        ));
        assert!(matches!(
            PdfDocument::load(b"not a pdf at all, just text"),
            Err(ViewerError::Load(_))
        ));
        assert!(matches!(
            PdfDocument::load(b"%PDF-1.7\ngarbage without objects"),
            Err(ViewerError::Load(_))
        ));
    }

    #[test]
    fn test_parse_rect_normalizes_reversed_corners() {
        let doc = Document::with_version("1.7");
        let rect = Object::Array(vec![
            Object::Integer(612),
            Object::Integer(792),
            Object::Integer(0),
            Object::Real(0.0),
        ]);
        assert_eq!(parse_rect(&doc, &rect), Some([0.0, 0.0, 612.0, 792.0]));
    }

    #[test]
    fn test_parse_rect_rejects_degenerate() {
        let doc = Document::with_version("1.7");
        let rect = Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(792),
        ]);
        assert_eq!(parse_rect(&doc, &rect), None);
    }
}
