//! Flatten annotations into the page content of the original PDF
//!
//! The original bytes are re-parsed for every export, so the loaded view is
//! never modified. Each annotated page gets its existing content wrapped in
//! `q ... Q` and one extra content stream that draws its notes and strokes.

use crate::annotations::{Annotation, AnnotationStore, InkStroke, TextAnnotation};
use crate::color::Rgb;
use crate::coords::{text_baseline_output, to_output_space};
use crate::document::page_box;
use crate::error::ExportError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, info};

/// Resource name for the note font. A numeric suffix is added when a page
/// already uses this name.
const FONT_RESOURCE: &str = "PdfMarkHelv";

/// Line advance for multi-line notes, as a multiple of the font size
const LINE_HEIGHT: f64 = 1.2;

const MAX_TREE_DEPTH: usize = 32;

/// Geometry of the page being drawn on, in output space
#[derive(Debug, Clone, Copy)]
struct PageFrame {
    origin_x: f64,
    origin_y: f64,
    height: f64,
}

impl PageFrame {
    fn new(doc: &Document, page_id: ObjectId) -> Self {
        let [x, y, _, height] = page_box(doc, page_id);
        Self {
            origin_x: x,
            origin_y: y,
            height,
        }
    }

    fn point(&self, pdf_x: f64, pdf_y: f64) -> (f64, f64) {
        let (x, y) = to_output_space(pdf_x, pdf_y, self.height);
        (self.origin_x + x, self.origin_y + y)
    }

    fn text_origin(&self, note: &TextAnnotation) -> (f64, f64) {
        let (x, y) = text_baseline_output(note.x, note.y, note.font_size, self.height);
        (self.origin_x + x, self.origin_y + y)
    }
}

/// Produce a new PDF with every annotation in `store` drawn into the page
/// content. Fails before producing any bytes.
pub fn export_pdf(original: &[u8], store: &AnnotationStore) -> Result<Vec<u8>, ExportError> {
    let mut doc =
        Document::load_mem(original).map_err(|e| ExportError::Corrupt(e.to_string()))?;

    if doc.is_encrypted() {
        doc.decrypt("")
            .map_err(|e| ExportError::Encrypted(e.to_string()))?;
        doc.trailer.remove(b"Encrypt");
        debug!("removed encryption from export copy");
    }

    let pages = doc.get_pages();
    let annotated = store.pages();
    if let Some(&missing) = annotated.iter().find(|page| !pages.contains_key(page)) {
        return Err(ExportError::MissingPage(missing));
    }

    let mut font_id: Option<ObjectId> = None;
    let mut drawn = 0usize;

    for page in &annotated {
        let page_id = *pages.get(page).ok_or(ExportError::MissingPage(*page))?;
        let frame = PageFrame::new(&doc, page_id);

        let has_text = store.texts_for_page(*page).any(|t| !t.text.trim().is_empty());
        let font_name = if has_text {
            let id = *font_id.get_or_insert_with(|| doc.add_object(helvetica()));
            Some(register_font(&mut doc, page_id, id)?)
        } else {
            None
        };

        let mut operations = Vec::new();
        for annotation in store.list_by_page(*page) {
            let before = operations.len();
            match annotation {
                Annotation::Text(note) => {
                    if let Some(name) = &font_name {
                        text_operations(&mut operations, note, name, &frame);
                    }
                }
                Annotation::Ink(stroke) => stroke_operations(&mut operations, stroke, &frame),
            }
            if operations.len() > before {
                drawn += 1;
            }
        }

        let overlay = Content { operations }
            .encode()
            .map_err(|e| ExportError::Write(e.to_string()))?;
        wrap_contents(&mut doc, page_id, overlay)?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| ExportError::Write(e.to_string()))?;

    info!(
        pages = annotated.len(),
        annotations = drawn,
        bytes = output.len(),
        "exported annotated PDF"
    );
    Ok(output)
}

/// Normalize a user-supplied download name. `None` means the user cancelled.
pub fn export_filename(requested: &str) -> Option<String> {
    let name = requested.trim();
    if name.is_empty() {
        return None;
    }
    if name.to_ascii_lowercase().ends_with(".pdf") {
        Some(name.to_string())
    } else {
        Some(format!("{}.pdf", name))
    }
}

fn helvetica() -> Object {
    Object::Dictionary(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn color_operands(color: Rgb) -> Vec<Object> {
    color
        .components()
        .iter()
        .map(|c| Object::Real(*c))
        .collect()
}

/// Map text to single-byte WinAnsi. Anything outside Latin-1 becomes `?`.
fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x09 => b' ',
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

fn text_operations(ops: &mut Vec<Operation>, note: &TextAnnotation, font: &[u8], frame: &PageFrame) {
    let text = note.text.trim();
    if text.is_empty() {
        return;
    }
    let (x, y) = frame.text_origin(note);

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(font.to_vec()), real(note.font_size)],
    ));
    ops.push(Operation::new("rg", color_operands(note.color)));
    ops.push(Operation::new("TL", vec![real(note.font_size * LINE_HEIGHT)]));
    ops.push(Operation::new("Td", vec![real(x), real(y)]));
    for (index, line) in text.lines().enumerate() {
        if index > 0 {
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_latin1(line), StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn stroke_operations(ops: &mut Vec<Operation>, stroke: &InkStroke, frame: &PageFrame) {
    let Some((first, rest)) = stroke.points.split_first() else {
        return;
    };
    if rest.is_empty() {
        return;
    }

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("RG", color_operands(stroke.color)));
    ops.push(Operation::new("w", vec![real(stroke.width)]));
    ops.push(Operation::new("J", vec![Object::Integer(1)]));
    ops.push(Operation::new("j", vec![Object::Integer(1)]));

    let (x, y) = frame.point(first.x, first.y);
    ops.push(Operation::new("m", vec![real(x), real(y)]));
    for point in rest {
        let (x, y) = frame.point(point.x, point.y);
        ops.push(Operation::new("l", vec![real(x), real(y)]));
    }
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, ExportError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| ExportError::Corrupt(e.to_string()))
}

/// The page's Resources as an owned dictionary, following references and
/// inheritance from the page tree
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;

    while let Some(dict) = current {
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(resources)) => return resources.clone(),
            Ok(Object::Reference(id)) => {
                return doc
                    .get_dictionary(*id)
                    .cloned()
                    .unwrap_or_else(|_| Dictionary::new())
            }
            _ => {}
        }

        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }

    Dictionary::new()
}

/// Add the note font to the page's resources and return its resource name.
/// The page gets its own copy of the resources so shared dictionaries are
/// left untouched.
fn register_font(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Result<Vec<u8>, ExportError> {
    let mut resources = effective_resources(doc, page_id);
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(fonts)) => fonts.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };

    let mut name = FONT_RESOURCE.as_bytes().to_vec();
    let mut suffix = 1;
    while fonts.has(&name) {
        name = format!("{}{}", FONT_RESOURCE, suffix).into_bytes();
        suffix += 1;
    }

    fonts.set(name.clone(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Replace the page's Contents with `[q, original..., Q + overlay]`
fn wrap_contents(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), ExportError> {
    let existing: Vec<Object> = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| ExportError::Corrupt(e.to_string()))?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut close = b"Q\n".to_vec();
    close.extend(overlay);
    let close_id = doc.add_object(Stream::new(Dictionary::new(), close));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}
