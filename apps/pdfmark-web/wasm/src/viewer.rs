//! `PdfMarkViewer`: the JS-facing wrapper around a [`ViewerSession`]
//!
//! The session lives in `Rc<RefCell<_>>` so that page renders and loads can
//! await pdf.js without holding a borrow; JS keeps calling scroll and pointer
//! methods while those promises are pending. Every borrow is released before
//! an await point.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::Promise;
use pdfmark_core::{
    AnnotationId, InputEvent, MountOutcome, ToolSettings, ViewerConfig, ViewerSession,
    ZoomOutcome,
};
use serde::Serialize;
use tracing::{debug, error, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{HtmlCanvasElement, HtmlElement};

use crate::canvas::{CanvasOverlay, CanvasRaster};
use crate::fetch::fetch_pdf;
use crate::pdf_bridge::PdfJsDocument;

type Session = ViewerSession<CanvasRaster, CanvasOverlay>;

struct ViewerState {
    session: Session,
    /// pdf.js handle for the document the session holds
    pdfjs: Option<Rc<PdfJsDocument>>,
}

impl ViewerState {
    fn unload(&mut self) {
        self.session.unload();
        self.pdfjs = None;
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Annotation ids cross into JS as plain numbers
pub fn annotation_id(value: f64) -> Option<AnnotationId> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as AnnotationId)
    } else {
        None
    }
}

/// Load `bytes` as generation `generation`. Resolves to `null` when a newer
/// load started while this one was waiting on pdf.js.
async fn load_into(
    state: Rc<RefCell<ViewerState>>,
    generation: Rc<Cell<u64>>,
    ticket: u64,
    bytes: Vec<u8>,
) -> Result<JsValue, JsValue> {
    let opened = PdfJsDocument::open(&bytes).await;
    if generation.get() != ticket {
        debug!(ticket, "load superseded, dropping result");
        return Ok(JsValue::NULL);
    }

    let mut state = state.borrow_mut();
    let preserve = state.session.config().preserve_on_failed_load;

    let pdfjs = match opened {
        Ok(pdfjs) => pdfjs,
        Err(message) => {
            error!(%message, "pdf.js could not open the document");
            if !preserve {
                state.unload();
            }
            return Err(JsValue::from_str(&format!("Failed to load PDF: {}", message)));
        }
    };

    let summary = match state.session.load(bytes) {
        Ok(summary) => summary,
        Err(e) => {
            // The session already applied the failed-load policy
            if !preserve {
                state.pdfjs = None;
            }
            return Err(JsValue::from_str(&e.to_string()));
        }
    };

    if pdfjs.page_count() != summary.info.page_count {
        warn!(
            pdfjs = pdfjs.page_count(),
            lopdf = summary.info.page_count,
            "page count differs between renderer and parser"
        );
    }
    state.pdfjs = Some(Rc::new(pdfjs));
    to_js(&summary)
}

#[wasm_bindgen]
pub struct PdfMarkViewer {
    state: Rc<RefCell<ViewerState>>,
    load_generation: Rc<Cell<u64>>,
}

#[wasm_bindgen]
impl PdfMarkViewer {
    /// Create a viewer. `config_json` is an optional, possibly partial,
    /// `ViewerConfig` object in JSON form.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<PdfMarkViewer, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => ViewerConfig::from_json(json),
            _ => Ok(ViewerConfig::default()),
        }
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let session = Session::new(config).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Self {
            state: Rc::new(RefCell::new(ViewerState {
                session,
                pdfjs: None,
            })),
            load_generation: Rc::new(Cell::new(0)),
        })
    }

    fn next_load(&self) -> u64 {
        let ticket = self.load_generation.get() + 1;
        self.load_generation.set(ticket);
        ticket
    }

    // ============ Loading ============

    /// Load a document from bytes. Resolves to the document summary, or to
    /// `null` if a newer load replaced this one first.
    #[wasm_bindgen(js_name = loadBytes)]
    pub fn load_bytes(&self, bytes: Vec<u8>) -> Promise {
        let ticket = self.next_load();
        future_to_promise(load_into(
            Rc::clone(&self.state),
            Rc::clone(&self.load_generation),
            ticket,
            bytes,
        ))
    }

    /// Fetch a document by URL and load it
    #[wasm_bindgen(js_name = loadUrl)]
    pub fn load_url(&self, url: String) -> Promise {
        let ticket = self.next_load();
        let state = Rc::clone(&self.state);
        let generation = Rc::clone(&self.load_generation);
        let allowed = self.state.borrow().session.config().allowed_schemes.clone();

        future_to_promise(async move {
            let bytes = fetch_pdf(&url, &allowed).await.map_err(|e| {
                error!(%url, error = %e, "fetch failed");
                JsValue::from_str(&e.to_string())
            })?;
            if generation.get() != ticket {
                return Ok(JsValue::NULL);
            }
            load_into(state, generation, ticket, bytes).await
        })
    }

    /// Drop the document, its annotations and every page surface
    pub fn unload(&self) {
        self.next_load();
        self.state.borrow_mut().unload();
    }

    #[wasm_bindgen(js_name = isLoaded)]
    pub fn is_loaded(&self) -> bool {
        self.state.borrow().session.document().is_some()
    }

    #[wasm_bindgen(js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.state.borrow().session.page_count()
    }

    /// Placeholder sizes and offsets for every page at the current scale
    #[wasm_bindgen(js_name = pageLayouts)]
    pub fn page_layouts(&self) -> Result<JsValue, JsValue> {
        to_js(&self.state.borrow().session.page_layouts())
    }

    // ============ Page surfaces ============

    /// Register the overlay canvas of page `page`
    #[wasm_bindgen(js_name = attachOverlay)]
    pub fn attach_overlay(&self, page: u32, canvas: HtmlCanvasElement) -> Result<(), JsValue> {
        let overlay = CanvasOverlay::new(canvas).map_err(|e| JsValue::from_str(&e))?;
        self.state
            .borrow_mut()
            .session
            .attach_overlay(page, overlay)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Render page `page` into a fresh canvas and, once displayed, make it
    /// the only child of `host`. Resolves to `true` when the render was
    /// displayed and `false` when it was skipped, failed, or arrived after
    /// the page left the live set or the zoom changed. A failed page is
    /// offered again by the next viewport update.
    #[wasm_bindgen(js_name = mountPage)]
    pub fn mount_page(&self, page: u32, host: HtmlElement) -> Promise {
        let started = {
            let mut state = self.state.borrow_mut();
            match state.pdfjs.clone() {
                Some(pdfjs) => state
                    .session
                    .begin_mount(page)
                    .map(|ticket| (ticket, pdfjs)),
                None => None,
            }
        };
        let Some((ticket, pdfjs)) = started else {
            return Promise::resolve(&JsValue::FALSE);
        };

        let state = Rc::clone(&self.state);
        future_to_promise(async move {
            let rendered = match CanvasRaster::create() {
                Ok(raster) => pdfjs
                    .render(page, raster.canvas(), ticket.scale())
                    .await
                    .map(|()| raster),
                Err(message) => Err(message),
            };

            let mut state = state.borrow_mut();
            let displayed = match rendered {
                Ok(raster) => {
                    let canvas = raster.canvas().clone();
                    let outcome = state.session.complete_mount(ticket, raster);
                    if outcome == MountOutcome::Displayed {
                        host.replace_children_with_node_1(&canvas);
                        true
                    } else {
                        false
                    }
                }
                Err(message) => {
                    debug!(page, %message, "page render failed");
                    state.session.fail_mount(ticket);
                    false
                }
            };
            Ok(JsValue::from_bool(displayed))
        })
    }

    /// Release page `page`. If it is still in the preload window the next
    /// viewport update reports it as entered again.
    #[wasm_bindgen(js_name = unmountPage)]
    pub fn unmount_page(&self, page: u32) -> bool {
        self.state.borrow_mut().session.unmount(page)
    }

    // ============ Scrolling ============

    /// Report the scroll position. Returns the visibility changes as
    /// `{Enter: page}` / `{Exit: page}` objects; exited pages are already
    /// unmounted.
    #[wasm_bindgen(js_name = updateViewport)]
    pub fn update_viewport(&self, scroll_top: f64, height: f64) -> Result<JsValue, JsValue> {
        let changes = self
            .state
            .borrow_mut()
            .session
            .update_viewport(scroll_top, height);
        to_js(&changes)
    }

    /// Re-evaluate the last reported scroll position, e.g. after a zoom
    #[wasm_bindgen(js_name = refreshViewport)]
    pub fn refresh_viewport(&self) -> Result<JsValue, JsValue> {
        let changes = self.state.borrow_mut().session.refresh_viewport();
        to_js(&changes)
    }

    #[wasm_bindgen(js_name = currentPage)]
    pub fn current_page(&self) -> u32 {
        self.state.borrow().session.current_page()
    }

    // ============ Zoom ============

    pub fn scale(&self) -> f64 {
        self.state.borrow().session.scale()
    }

    #[wasm_bindgen(js_name = zoomPercent)]
    pub fn zoom_percent(&self) -> u32 {
        self.state.borrow().session.zoom_percent()
    }

    /// Returns `true` when the scale changed; page layouts must then be
    /// reapplied and the viewport refreshed.
    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&self) -> bool {
        rescaled(self.state.borrow_mut().session.zoom_in())
    }

    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&self) -> bool {
        rescaled(self.state.borrow_mut().session.zoom_out())
    }

    #[wasm_bindgen(js_name = setScale)]
    pub fn set_scale(&self, scale: f64) -> bool {
        rescaled(self.state.borrow_mut().session.set_scale(scale))
    }

    // ============ Tools ============

    /// Current mode as `"Idle"`, `"PlacingText"` or `"Drawing"`
    pub fn mode(&self) -> Result<JsValue, JsValue> {
        to_js(&self.state.borrow().session.mode())
    }

    #[wasm_bindgen(js_name = toggleTextMode)]
    pub fn toggle_text_mode(&self) -> Result<JsValue, JsValue> {
        let mode = self.state.borrow_mut().session.toggle_text_mode();
        to_js(&mode)
    }

    #[wasm_bindgen(js_name = toggleDrawMode)]
    pub fn toggle_draw_mode(&self) -> Result<JsValue, JsValue> {
        let mode = self.state.borrow_mut().session.toggle_draw_mode();
        to_js(&mode)
    }

    pub fn tools(&self) -> Result<JsValue, JsValue> {
        to_js(self.state.borrow().session.tools())
    }

    /// Replace the tool settings, e.g.
    /// `{stroke_color: "#0000ff", stroke_width: 3, text_color: "#000000", font_size: 14}`
    #[wasm_bindgen(js_name = setTools)]
    pub fn set_tools(&self, tools: JsValue) -> Result<(), JsValue> {
        let tools: ToolSettings = serde_wasm_bindgen::from_value(tools)
            .map_err(|e| JsValue::from_str(&format!("Invalid tool settings: {}", e)))?;
        self.state
            .borrow_mut()
            .session
            .set_tools(tools)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // ============ Pointer input ============
    //
    // Coordinates are pixels relative to the page overlay's top-left corner.
    // Each method returns the resulting effect as `{type: ..., ...}`.

    pub fn click(
        &self,
        page: u32,
        x: f64,
        y: f64,
        on_annotation: bool,
    ) -> Result<JsValue, JsValue> {
        self.dispatch(InputEvent::Click {
            page,
            x,
            y,
            on_annotation,
        })
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&self, page: u32, x: f64, y: f64) -> Result<JsValue, JsValue> {
        self.dispatch(InputEvent::PointerDown { page, x, y })
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&self, page: u32, x: f64, y: f64) -> Result<JsValue, JsValue> {
        self.dispatch(InputEvent::PointerMove { page, x, y })
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&self, page: u32) -> Result<JsValue, JsValue> {
        self.dispatch(InputEvent::PointerUp { page })
    }

    #[wasm_bindgen(js_name = pointerLeave)]
    pub fn pointer_leave(&self, page: u32) -> Result<JsValue, JsValue> {
        self.dispatch(InputEvent::PointerLeave { page })
    }

    fn dispatch(&self, event: InputEvent) -> Result<JsValue, JsValue> {
        let effect = self.state.borrow_mut().session.dispatch(event);
        to_js(&effect)
    }

    // ============ Notes ============

    /// Reopen the editor of an existing note
    #[wasm_bindgen(js_name = beginTextEdit)]
    pub fn begin_text_edit(&self, id: f64) -> bool {
        annotation_id(id)
            .is_some_and(|id| self.state.borrow_mut().session.begin_text_edit(id))
    }

    /// Close a note's editor. Resolves to `"Stored"`, `"Removed"` (the text
    /// was blank) or `"Missing"`.
    #[wasm_bindgen(js_name = commitText)]
    pub fn commit_text(&self, id: f64, text: &str) -> Result<JsValue, JsValue> {
        let id = annotation_id(id)
            .ok_or_else(|| JsValue::from_str(&format!("Invalid annotation id: {}", id)))?;
        let outcome = self.state.borrow_mut().session.commit_text(id, text);
        to_js(&outcome)
    }

    /// Screen placements of the notes on `page` at the current scale
    #[wasm_bindgen(js_name = textPlacements)]
    pub fn text_placements(&self, page: u32) -> Result<JsValue, JsValue> {
        to_js(&self.state.borrow().session.text_placements(page))
    }

    #[wasm_bindgen(js_name = removeAnnotation)]
    pub fn remove_annotation(&self, id: f64) -> bool {
        annotation_id(id)
            .is_some_and(|id| self.state.borrow_mut().session.remove_annotation(id))
    }

    /// All annotations as JSON, in PDF space
    #[wasm_bindgen(js_name = annotationsJson)]
    pub fn annotations_json(&self) -> Result<String, JsValue> {
        self.state
            .borrow()
            .session
            .store()
            .to_json()
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    // ============ Export ============

    /// Flatten every annotation into a copy of the loaded PDF
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&self) -> Result<js_sys::Uint8Array, JsValue> {
        let bytes = self
            .state
            .borrow()
            .session
            .export()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(js_sys::Uint8Array::from(bytes.as_slice()))
    }

    /// Download name for the export. Falls back to the configured default
    /// when `requested` is missing; a blank name yields `None`.
    #[wasm_bindgen(js_name = exportFilename)]
    pub fn export_filename(&self, requested: Option<String>) -> Option<String> {
        self.state
            .borrow()
            .session
            .export_filename(requested.as_deref())
    }
}

fn rescaled(outcome: ZoomOutcome) -> bool {
    match outcome {
        ZoomOutcome::Unchanged => false,
        ZoomOutcome::Rescaled { scale, remount } => {
            debug!(scale, pages = remount.len(), "zoom changed");
            true
        }
    }
}
