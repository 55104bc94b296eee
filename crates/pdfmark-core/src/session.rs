//! Viewer session: one open document with its annotations, zoom, tool mode
//! and page mounts
//!
//! The platform layer owns the event loop. It feeds scroll positions into
//! [`ViewerSession::update_viewport`], pointer input into
//! [`ViewerSession::dispatch`], and drives page mounts with the tickets the
//! session hands out.

use crate::annotations::{AnnotationId, AnnotationStore, StrokeBuilder, TextCommit};
use crate::color::Rgb;
use crate::config::{ToolSettings, ViewerConfig};
use crate::coords::{scale_length, ScreenPoint};
use crate::document::{DocumentInfo, PdfDocument, Viewport};
use crate::error::ViewerError;
use crate::export::{export_filename, export_pdf};
use crate::render::{
    text_placements, MountOutcome, MountTicket, OverlaySurface, RasterSurface, RenderPipeline,
    TextPlacement,
};
use crate::visibility::{
    layout_pages, page_at_center, PageLayout, ViewportWindow, VisibilityChange,
    VisibilityController,
};
use serde::Serialize;
use tracing::{debug, error, info};

/// The active tool. Text placement and drawing are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Mode {
    #[default]
    Idle,
    PlacingText,
    Drawing,
}

/// Pointer input relative to a page's overlay, in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Click {
        page: u32,
        x: f64,
        y: f64,
        /// The click landed on an existing note's editor
        on_annotation: bool,
    },
    PointerDown { page: u32, x: f64, y: f64 },
    PointerMove { page: u32, x: f64, y: f64 },
    PointerUp { page: u32 },
    PointerLeave { page: u32 },
}

impl InputEvent {
    pub fn page(&self) -> u32 {
        match *self {
            InputEvent::Click { page, .. }
            | InputEvent::PointerDown { page, .. }
            | InputEvent::PointerMove { page, .. }
            | InputEvent::PointerUp { page }
            | InputEvent::PointerLeave { page } => page,
        }
    }
}

/// What the platform should do in response to an input event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Effect {
    Ignored,
    /// A new empty note was created; open an editor at this placement
    TextPlaced { placement: TextPlacement },
    StrokeStarted { page: u32 },
    /// Live feedback segment, already drawn on the page overlay
    StrokeSegment {
        page: u32,
        from: ScreenPoint,
        to: ScreenPoint,
        color: Rgb,
        width: f64,
    },
    StrokeCommitted { page: u32, id: AnnotationId },
    StrokeDiscarded { page: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZoomOutcome {
    /// The clamped scale equals the current one
    Unchanged,
    /// Every render was invalidated. `remount` lists the pages that were live.
    Rescaled { scale: f64, remount: Vec<u32> },
}

/// Returned by a successful load
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub info: DocumentInfo,
    /// Placeholder sizes at the current scale, in page order
    pub pages: Vec<Viewport>,
}

pub struct ViewerSession<R, O> {
    config: ViewerConfig,
    tools: ToolSettings,
    scale: f64,
    mode: Mode,
    document: Option<PdfDocument>,
    /// Raw input, kept for export
    original: Option<Vec<u8>>,
    store: AnnotationStore,
    pipeline: RenderPipeline<R, O>,
    visibility: VisibilityController,
    layouts: Vec<PageLayout>,
    window: Option<ViewportWindow>,
    current_page: u32,
    active_stroke: Option<StrokeBuilder>,
}

impl<R: RasterSurface, O: OverlaySurface> ViewerSession<R, O> {
    pub fn new(config: ViewerConfig) -> Result<Self, ViewerError> {
        config.validate()?;
        Ok(Self {
            tools: config.tools.clone(),
            scale: config.initial_scale,
            mode: Mode::Idle,
            document: None,
            original: None,
            store: AnnotationStore::new(),
            pipeline: RenderPipeline::new(),
            visibility: VisibilityController::new(config.preload_margin),
            layouts: Vec::new(),
            window: None,
            current_page: 0,
            active_stroke: None,
            config,
        })
    }

    // ============ Document lifecycle ============

    /// Replace the current document. All annotations and page surfaces of
    /// the previous document are discarded.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<DocumentSummary, ViewerError> {
        let document = if self.config.preserve_on_failed_load {
            let parsed = PdfDocument::load(&bytes).inspect_err(|e| {
                error!(error = %e, "load failed, keeping current document");
            })?;
            self.reset();
            parsed
        } else {
            self.reset();
            PdfDocument::load(&bytes).inspect_err(|e| {
                error!(error = %e, "load failed");
            })?
        };

        let base: Vec<Viewport> = document.pages().iter().map(|p| p.base_viewport()).collect();
        self.pipeline.register_pages(&base);
        self.document = Some(document);
        self.original = Some(bytes);
        self.current_page = 1;
        self.relayout();

        let summary = self.summary().ok_or(ViewerError::NoDocument)?;
        info!(
            pages = summary.info.page_count,
            scale = self.scale,
            "document ready"
        );
        Ok(summary)
    }

    pub fn unload(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.active_stroke = None;
        self.mode = Mode::Idle;
        self.store.clear();
        self.pipeline.clear();
        self.visibility.invalidate();
        self.layouts.clear();
        self.current_page = 0;
        self.original = None;
        if let Some(document) = self.document.take() {
            document.unload();
        }
    }

    pub fn summary(&self) -> Option<DocumentSummary> {
        let document = self.document.as_ref()?;
        Some(DocumentSummary {
            info: document.info().clone(),
            pages: document
                .pages()
                .iter()
                .map(|p| p.viewport(self.scale))
                .collect(),
        })
    }

    pub fn document(&self) -> Option<&PdfDocument> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, PdfDocument::page_count)
    }

    fn has_page(&self, page: u32) -> bool {
        (1..=self.page_count()).contains(&page)
    }

    fn relayout(&mut self) {
        let viewports: Vec<Viewport> = match &self.document {
            Some(document) => document
                .pages()
                .iter()
                .map(|p| p.viewport(self.scale))
                .collect(),
            None => Vec::new(),
        };
        self.layouts = layout_pages(&viewports, self.config.page_gap);
    }

    // ============ Zoom ============

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    pub fn zoom(&mut self, delta: f64) -> ZoomOutcome {
        self.set_scale(self.scale + delta)
    }

    pub fn zoom_in(&mut self) -> ZoomOutcome {
        self.zoom(self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> ZoomOutcome {
        self.zoom(-self.config.zoom_step)
    }

    /// Set an absolute scale, clamped to the configured bounds. Every mounted
    /// page is released; the next `update_viewport` re-enters visible pages.
    pub fn set_scale(&mut self, requested: f64) -> ZoomOutcome {
        if requested.is_nan() {
            return ZoomOutcome::Unchanged;
        }
        let scale = self.config.clamp_scale(requested);
        if scale == self.scale {
            return ZoomOutcome::Unchanged;
        }

        debug!(from = self.scale, to = scale, "zoom");
        self.scale = scale;
        let remount = self.pipeline.rescale(scale);
        self.visibility.invalidate();
        self.relayout();

        ZoomOutcome::Rescaled { scale, remount }
    }

    // ============ Modes and tools ============

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn toggle_text_mode(&mut self) -> Mode {
        if self.mode == Mode::PlacingText {
            self.mode = Mode::Idle;
        } else {
            self.finish_stroke();
            self.mode = Mode::PlacingText;
        }
        self.mode
    }

    pub fn toggle_draw_mode(&mut self) -> Mode {
        if self.mode == Mode::Drawing {
            self.finish_stroke();
            self.mode = Mode::Idle;
        } else {
            self.mode = Mode::Drawing;
        }
        self.mode
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }

    /// Replace the tool settings used for the next note or stroke
    pub fn set_tools(&mut self, tools: ToolSettings) -> Result<(), ViewerError> {
        tools.validate()?;
        self.tools = tools;
        Ok(())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    // ============ Visibility and mounting ============

    /// Feed the scroll container's position. Pages that left the preload
    /// window are unmounted here; the caller mounts the entered ones.
    pub fn update_viewport(&mut self, scroll_top: f64, height: f64) -> Vec<VisibilityChange> {
        let window = ViewportWindow::new(scroll_top, height);
        self.window = Some(window);

        let changes = self.visibility.update(&self.layouts, window);
        for change in &changes {
            if let VisibilityChange::Exit(page) = change {
                self.pipeline.unmount(*page);
            }
        }

        self.current_page = page_at_center(&self.layouts, window).unwrap_or(0);
        changes
    }

    /// Re-run visibility against the last known scroll position, e.g. after
    /// a zoom
    pub fn refresh_viewport(&mut self) -> Vec<VisibilityChange> {
        match self.window {
            Some(window) => self.update_viewport(window.scroll_top, window.height),
            None => Vec::new(),
        }
    }

    /// Page under the viewport's center line (0 when nothing is loaded)
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_layouts(&self) -> &[PageLayout] {
        &self.layouts
    }

    /// Placeholder size of `page` at the current scale
    pub fn page_size(&self, page: u32) -> Result<Viewport, ViewerError> {
        self.document
            .as_ref()
            .ok_or(ViewerError::NoDocument)?
            .get_viewport(page, self.scale)
    }

    pub fn attach_overlay(&mut self, page: u32, overlay: O) -> Result<(), ViewerError> {
        self.pipeline.attach_overlay(page, overlay)
    }

    pub fn begin_mount(&mut self, page: u32) -> Option<MountTicket> {
        self.pipeline.begin_mount(page, self.scale)
    }

    pub fn complete_mount(&mut self, ticket: MountTicket, raster: R) -> MountOutcome {
        self.pipeline
            .complete_mount(ticket, raster, self.scale, &self.store)
    }

    /// Record a failed render. The page is dropped from the live set so the
    /// next viewport update offers it for mounting again.
    pub fn fail_mount(&mut self, ticket: MountTicket) -> bool {
        let failed = self.pipeline.fail_mount(ticket);
        if failed {
            self.visibility.forget(ticket.page());
        }
        failed
    }

    /// Release a page on the caller's request. It re-enters on the next
    /// viewport update if it is still in the preload window.
    pub fn unmount(&mut self, page: u32) -> bool {
        self.visibility.forget(page);
        self.pipeline.unmount(page)
    }

    pub fn pipeline(&self) -> &RenderPipeline<R, O> {
        &self.pipeline
    }

    // ============ Input dispatch ============

    pub fn dispatch(&mut self, event: InputEvent) -> Effect {
        if !self.has_page(event.page()) {
            return Effect::Ignored;
        }

        match (self.mode, event) {
            (
                Mode::PlacingText,
                InputEvent::Click {
                    page,
                    x,
                    y,
                    on_annotation: false,
                },
            ) => self.place_text(page, ScreenPoint::new(x, y)),
            (Mode::Drawing, InputEvent::PointerDown { page, x, y }) => {
                self.finish_stroke();
                let point = ScreenPoint::new(x, y).to_pdf_space(self.scale);
                let mut builder =
                    self.store
                        .begin_stroke(page, self.tools.stroke_color, self.tools.stroke_width);
                builder.append_point(point.x, point.y);
                self.active_stroke = Some(builder);
                Effect::StrokeStarted { page }
            }
            (Mode::Drawing, InputEvent::PointerMove { page, x, y }) => {
                self.extend_stroke(page, ScreenPoint::new(x, y))
            }
            (Mode::Drawing, InputEvent::PointerUp { page })
            | (Mode::Drawing, InputEvent::PointerLeave { page }) => {
                let on_stroke_page = self
                    .active_stroke
                    .as_ref()
                    .is_some_and(|builder| builder.page() == page);
                if on_stroke_page {
                    self.finish_stroke().unwrap_or(Effect::Ignored)
                } else {
                    Effect::Ignored
                }
            }
            _ => Effect::Ignored,
        }
    }

    fn place_text(&mut self, page: u32, at: ScreenPoint) -> Effect {
        let pdf = at.to_pdf_space(self.scale);
        let id = self
            .store
            .add_text(page, pdf.x, pdf.y, self.tools.text_color, self.tools.font_size);
        // One note per activation
        self.mode = Mode::Idle;

        match text_placements(&self.store, page, self.scale)
            .into_iter()
            .find(|p| p.id == id)
        {
            Some(placement) => Effect::TextPlaced { placement },
            None => Effect::Ignored,
        }
    }

    fn extend_stroke(&mut self, page: u32, at: ScreenPoint) -> Effect {
        let scale = self.scale;
        let Some(builder) = self.active_stroke.as_mut().filter(|b| b.page() == page) else {
            return Effect::Ignored;
        };
        let Some(previous) = builder.last_point() else {
            return Effect::Ignored;
        };

        let pdf = at.to_pdf_space(scale);
        builder.append_point(pdf.x, pdf.y);

        let from = previous.to_screen(scale);
        let color = builder.color();
        let width = scale_length(builder.width(), scale);
        self.pipeline.draw_segment(page, from, at, color, width);

        Effect::StrokeSegment {
            page,
            from,
            to: at,
            color,
            width,
        }
    }

    /// End the active stroke, if any, committing it when it has enough
    /// points. The page overlay is repainted either way so live feedback for
    /// a discarded stroke disappears.
    fn finish_stroke(&mut self) -> Option<Effect> {
        let builder = self.active_stroke.take()?;
        let page = builder.page();
        let committed = self.store.end_stroke(builder);
        self.pipeline.redraw_overlay(page, self.scale, &self.store);

        Some(match committed {
            Some(id) => {
                debug!(page, id, "stroke committed");
                Effect::StrokeCommitted { page, id }
            }
            None => Effect::StrokeDiscarded { page },
        })
    }

    // ============ Annotations ============

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn begin_text_edit(&mut self, id: AnnotationId) -> bool {
        self.store.begin_edit(id)
    }

    pub fn commit_text(&mut self, id: AnnotationId, text: &str) -> TextCommit {
        self.store.commit_text(id, text)
    }

    pub fn text_placements(&self, page: u32) -> Vec<TextPlacement> {
        text_placements(&self.store, page, self.scale)
    }

    /// Delete an annotation and repaint its page
    pub fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        let Some(page) = self.store.get(id).map(|a| a.page()) else {
            return false;
        };
        let removed = self.store.remove(id);
        self.pipeline.redraw_overlay(page, self.scale, &self.store);
        removed
    }

    // ============ Export ============

    /// Flatten the annotations into a copy of the loaded PDF
    pub fn export(&self) -> Result<Vec<u8>, ViewerError> {
        let original = self.original.as_deref().ok_or(ViewerError::NoDocument)?;
        export_pdf(original, &self.store).map_err(|e| {
            error!(error = %e, "export failed");
            ViewerError::from(e)
        })
    }

    /// Download name for the export, or `None` if the user cleared it
    pub fn export_filename(&self, requested: Option<&str>) -> Option<String> {
        export_filename(requested.unwrap_or(self.config.default_export_name.as_str()))
    }
}
