//! Annotation store for text notes and ink strokes
//!
//! All geometry is kept in PDF-space (scale 1.0, top-left origin) so that
//! zooming never touches stored data. Records are kept in insertion order,
//! which is also the paint order: later strokes draw on top.

use crate::color::Rgb;
use crate::coords::PdfPoint;
use serde::Serialize;
use std::collections::BTreeSet;

pub type AnnotationId = u64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub page: u32,
    /// Top-left anchor in PDF-space
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: Rgb,
    pub font_size: f64,
    /// True while the note's editor is open
    pub editing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InkStroke {
    pub id: AnnotationId,
    pub page: u32,
    pub color: Rgb,
    pub width: f64,
    pub points: Vec<PdfPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Annotation {
    Text(TextAnnotation),
    Ink(InkStroke),
}

impl Annotation {
    pub fn id(&self) -> AnnotationId {
        match self {
            Annotation::Text(t) => t.id,
            Annotation::Ink(s) => s.id,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Annotation::Text(t) => t.page,
            Annotation::Ink(s) => s.page,
        }
    }
}

/// Result of closing a note's editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextCommit {
    /// Trimmed text was stored
    Stored,
    /// Text was empty, the note is gone
    Removed,
    /// No text note with that id
    Missing,
}

/// A stroke being drawn. Points accumulate here and only reach the store
/// through [`AnnotationStore::end_stroke`].
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    page: u32,
    color: Rgb,
    width: f64,
    points: Vec<PdfPoint>,
    generation: u64,
}

impl StrokeBuilder {
    pub fn append_point(&mut self, x: f64, y: f64) {
        self.points.push(PdfPoint::new(x, y));
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn points(&self) -> &[PdfPoint] {
        &self.points
    }

    pub fn last_point(&self) -> Option<PdfPoint> {
        self.points.last().copied()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotationStore {
    #[serde(skip)]
    next_id: AnnotationId,
    /// Bumped by `clear` so builders started before it cannot commit
    #[serde(skip)]
    generation: u64,
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Create an empty text note in editing state
    pub fn add_text(
        &mut self,
        page: u32,
        x: f64,
        y: f64,
        color: Rgb,
        font_size: f64,
    ) -> AnnotationId {
        let id = self.allocate_id();
        self.annotations.push(Annotation::Text(TextAnnotation {
            id,
            page,
            x,
            y,
            text: String::new(),
            color,
            font_size,
            editing: true,
        }));
        id
    }

    /// Re-open an existing note. Returns false if the id is not a text note.
    pub fn begin_edit(&mut self, id: AnnotationId) -> bool {
        match self.text_mut(id) {
            Some(note) => {
                note.editing = true;
                true
            }
            None => false,
        }
    }

    pub fn commit_text(&mut self, id: AnnotationId, text: &str) -> TextCommit {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            let is_text = matches!(self.get(id), Some(Annotation::Text(_)));
            if is_text && self.remove(id) {
                return TextCommit::Removed;
            }
            return TextCommit::Missing;
        }

        match self.text_mut(id) {
            Some(note) => {
                note.text = trimmed.to_string();
                note.editing = false;
                TextCommit::Stored
            }
            None => TextCommit::Missing,
        }
    }

    pub fn begin_stroke(&self, page: u32, color: Rgb, width: f64) -> StrokeBuilder {
        StrokeBuilder {
            page,
            color,
            width,
            points: Vec::new(),
            generation: self.generation,
        }
    }

    /// Commit a finished stroke. Strokes with fewer than two points, and
    /// strokes begun before the last `clear`, are dropped.
    pub fn end_stroke(&mut self, builder: StrokeBuilder) -> Option<AnnotationId> {
        if builder.points.len() < 2 || builder.generation != self.generation {
            return None;
        }

        let id = self.allocate_id();
        self.annotations.push(Annotation::Ink(InkStroke {
            id,
            page: builder.page,
            color: builder.color,
            width: builder.width,
            points: builder.points,
        }));
        Some(id)
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id() == id)
    }

    fn text_mut(&mut self, id: AnnotationId) -> Option<&mut TextAnnotation> {
        self.annotations.iter_mut().find_map(|a| match a {
            Annotation::Text(t) if t.id == id => Some(t),
            _ => None,
        })
    }

    pub fn remove(&mut self, id: AnnotationId) -> bool {
        if let Some(pos) = self.annotations.iter().position(|a| a.id() == id) {
            self.annotations.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.generation += 1;
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn list_by_page(&self, page: u32) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.page() == page)
            .collect()
    }

    pub fn texts_for_page(&self, page: u32) -> impl Iterator<Item = &TextAnnotation> {
        self.annotations.iter().filter_map(move |a| match a {
            Annotation::Text(t) if t.page == page => Some(t),
            _ => None,
        })
    }

    pub fn strokes_for_page(&self, page: u32) -> impl Iterator<Item = &InkStroke> {
        self.annotations.iter().filter_map(move |a| match a {
            Annotation::Ink(s) if s.page == page => Some(s),
            _ => None,
        })
    }

    /// Page numbers that carry at least one annotation, ascending
    pub fn pages(&self) -> Vec<u32> {
        self.annotations
            .iter()
            .map(Annotation::page)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_store_new_is_empty() {
        let store = AnnotationStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.pages().is_empty());
    }

    #[test]
    fn test_add_text_starts_empty_and_editing() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(1, 10.0, 20.0, Rgb::BLACK, 16.0);

        match store.get(id) {
            Some(Annotation::Text(note)) => {
                assert_eq!(note.text, "");
                assert!(note.editing);
                assert_eq!((note.x, note.y), (10.0, 20.0));
            }
            other => panic!("expected text note, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let mut store = AnnotationStore::new();
        let a = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);
        let b = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);
        let mut stroke = store.begin_stroke(1, Rgb::RED, 2.0);
        stroke.append_point(0.0, 0.0);
        stroke.append_point(1.0, 1.0);
        let c = store.end_stroke(stroke).unwrap();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_commit_text_trims_and_stores() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);

        assert_eq!(store.commit_text(id, "  hello world \n"), TextCommit::Stored);
        match store.get(id) {
            Some(Annotation::Text(note)) => {
                assert_eq!(note.text, "hello world");
                assert!(!note.editing);
            }
            other => panic!("expected text note, got {:?}", other),
        }
    }

    #[test]
    fn test_commit_whitespace_removes_note() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);

        assert_eq!(store.commit_text(id, " \t\n "), TextCommit::Removed);
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_commit_unknown_id() {
        let mut store = AnnotationStore::new();
        assert_eq!(store.commit_text(42, "text"), TextCommit::Missing);
        assert_eq!(store.commit_text(42, ""), TextCommit::Missing);
    }

    #[test]
    fn test_commit_text_ignores_strokes() {
        let mut store = AnnotationStore::new();
        let mut stroke = store.begin_stroke(1, Rgb::RED, 2.0);
        stroke.append_point(0.0, 0.0);
        stroke.append_point(5.0, 5.0);
        let id = store.end_stroke(stroke).unwrap();

        assert_eq!(store.commit_text(id, ""), TextCommit::Missing);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_begin_edit_reopens_note() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(2, 0.0, 0.0, Rgb::BLACK, 12.0);
        store.commit_text(id, "note");

        assert!(store.begin_edit(id));
        assert!(matches!(store.get(id), Some(Annotation::Text(t)) if t.editing));
        assert!(!store.begin_edit(999));
    }

    #[test]
    fn test_single_point_stroke_is_discarded() {
        let mut store = AnnotationStore::new();
        let mut stroke = store.begin_stroke(1, Rgb::RED, 2.0);
        stroke.append_point(3.0, 4.0);

        assert_eq!(store.end_stroke(stroke), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stroke_keeps_point_order() {
        let mut store = AnnotationStore::new();
        let mut stroke = store.begin_stroke(3, Rgb::RED, 2.5);
        stroke.append_point(1.0, 1.0);
        stroke.append_point(2.0, 4.0);
        stroke.append_point(3.0, 9.0);
        let id = store.end_stroke(stroke).unwrap();

        let strokes: Vec<&InkStroke> = store.strokes_for_page(3).collect();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].id, id);
        assert_eq!(
            strokes[0].points,
            vec![
                PdfPoint::new(1.0, 1.0),
                PdfPoint::new(2.0, 4.0),
                PdfPoint::new(3.0, 9.0)
            ]
        );
    }

    #[test]
    fn test_stroke_from_before_clear_is_dropped() {
        let mut store = AnnotationStore::new();
        let mut stroke = store.begin_stroke(1, Rgb::RED, 2.0);
        stroke.append_point(0.0, 0.0);
        stroke.append_point(1.0, 1.0);

        store.clear();
        assert_eq!(store.end_stroke(stroke), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_by_page_in_insertion_order() {
        let mut store = AnnotationStore::new();
        let a = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);
        let _ = store.add_text(2, 0.0, 0.0, Rgb::BLACK, 12.0);
        let mut stroke = store.begin_stroke(1, Rgb::RED, 2.0);
        stroke.append_point(0.0, 0.0);
        stroke.append_point(1.0, 1.0);
        let c = store.end_stroke(stroke).unwrap();

        let ids: Vec<AnnotationId> = store.list_by_page(1).iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(store.texts_for_page(1).count(), 1);
        assert_eq!(store.pages(), vec![1, 2]);
    }

    #[test]
    fn test_remove() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);
        assert!(store.remove(id));
        assert!(!store.remove(id));
    }

    #[test]
    fn test_to_json_tags_variants() {
        let mut store = AnnotationStore::new();
        let id = store.add_text(1, 5.0, 6.0, Rgb::BLACK, 12.0);
        store.commit_text(id, "Hi");

        let json = store.to_json().unwrap();
        assert!(json.contains(r#""type":"Text""#));
        assert!(json.contains(r##""color":"#000000""##));
        assert!(json.contains(r#""text":"Hi""#));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn point() -> impl Strategy<Value = (f64, f64)> {
        (0.0f64..1000.0, 0.0f64..1000.0)
    }

    proptest! {
        /// Property: a stroke is committed iff it has at least two points,
        /// and committed points are stored in input order
        #[test]
        fn stroke_commit_rule(points in prop::collection::vec(point(), 0..20)) {
            let mut store = AnnotationStore::new();
            let mut stroke = store.begin_stroke(1, Rgb::RED, 2.0);
            for (x, y) in &points {
                stroke.append_point(*x, *y);
            }

            let committed = store.end_stroke(stroke);
            prop_assert_eq!(committed.is_some(), points.len() >= 2);

            if let Some(id) = committed {
                match store.get(id) {
                    Some(Annotation::Ink(ink)) => {
                        let stored: Vec<(f64, f64)> =
                            ink.points.iter().map(|p| (p.x, p.y)).collect();
                        prop_assert_eq!(stored, points);
                    }
                    other => prop_assert!(false, "expected ink, got {:?}", other),
                }
            } else {
                prop_assert!(store.is_empty());
            }
        }

        /// Property: committing text stores exactly the trimmed content,
        /// or removes the note when nothing is left
        #[test]
        fn text_commit_rule(text in "[ \\ta-z\\n]{0,24}") {
            let mut store = AnnotationStore::new();
            let id = store.add_text(1, 0.0, 0.0, Rgb::BLACK, 12.0);

            let outcome = store.commit_text(id, &text);
            let trimmed = text.trim();

            if trimmed.is_empty() {
                prop_assert_eq!(outcome, TextCommit::Removed);
                prop_assert!(store.get(id).is_none());
            } else {
                prop_assert_eq!(outcome, TextCommit::Stored);
                match store.get(id) {
                    Some(Annotation::Text(note)) => prop_assert_eq!(note.text.as_str(), trimmed),
                    other => prop_assert!(false, "expected text, got {:?}", other),
                }
            }
        }
    }
}
