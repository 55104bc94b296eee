//! Render pipeline: per-page mount state and surface ownership
//!
//! Each page placeholder owns an overlay surface for the document's lifetime
//! and, while it is live, a raster surface holding the rendered page. Raster
//! work happens asynchronously on the platform side. A mount is started with
//! [`RenderPipeline::begin_mount`], which hands out a ticket, and finished
//! with [`RenderPipeline::complete_mount`]. A result whose ticket no longer
//! matches the page (unmounted, rescaled, document cleared) is released
//! instead of being displayed.

use crate::annotations::{AnnotationId, AnnotationStore};
use crate::color::Rgb;
use crate::coords::{scale_length, PdfPoint, ScreenPoint};
use crate::document::Viewport;
use crate::error::ViewerError;
use serde::Serialize;
use tracing::debug;

/// A rendered page image (e.g. a canvas with the page drawn on it).
///
/// Each mount renders into a surface of its own. Two tickets for the same
/// page never share one, so releasing a discarded render cannot touch the
/// page that is on screen.
pub trait RasterSurface {
    /// Pixel size of the surface
    fn size(&self) -> (u32, u32);

    /// Free this surface's backing memory and nothing else. Called exactly
    /// once per surface.
    fn release(&mut self);
}

/// The transparent drawing layer above a page
pub trait OverlaySurface {
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    /// Stroke an open path through `points` (screen pixels) with round caps
    /// and joins
    fn stroke_polyline(&mut self, points: &[ScreenPoint], color: Rgb, width: f64);
}

/// Handle for one in-flight mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountTicket {
    page: u32,
    scale: f64,
    epoch: u64,
    serial: u64,
}

impl MountTicket {
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Scale the page must be rasterized at
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MountState {
    Unmounted,
    Mounting(MountTicket),
    Live { scale: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The page was unmounted or re-mounted while the render was running
    StaleTicket,
    /// The zoom changed while the render was running
    ScaleChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Displayed,
    Discarded(DiscardReason),
}

/// Screen position of a text note for the platform's editor element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPlacement {
    pub id: AnnotationId,
    pub page: u32,
    pub left: f64,
    pub top: f64,
    pub font_size: f64,
    pub color: String,
    pub text: String,
    pub editing: bool,
}

/// Screen placements for every text note on `page`, derived from stored
/// PDF-space data
pub fn text_placements(store: &AnnotationStore, page: u32, scale: f64) -> Vec<TextPlacement> {
    store
        .texts_for_page(page)
        .map(|note| {
            let anchor = PdfPoint::new(note.x, note.y).to_screen(scale);
            TextPlacement {
                id: note.id,
                page: note.page,
                left: anchor.x,
                top: anchor.y,
                font_size: scale_length(note.font_size, scale),
                color: note.color.to_hex(),
                text: note.text.clone(),
                editing: note.editing,
            }
        })
        .collect()
}

/// Repaint every committed stroke of `page` onto `overlay`
pub fn paint_strokes<O: OverlaySurface>(
    overlay: &mut O,
    store: &AnnotationStore,
    page: u32,
    scale: f64,
) {
    overlay.clear();
    for stroke in store.strokes_for_page(page) {
        let points: Vec<ScreenPoint> = stroke.points.iter().map(|p| p.to_screen(scale)).collect();
        overlay.stroke_polyline(&points, stroke.color, scale_length(stroke.width, scale));
    }
}

fn resize_overlay<O: OverlaySurface>(overlay: &mut O, viewport: Viewport) {
    // `as` saturates, so negative or NaN sizes become 0
    overlay.resize(viewport.width as u32, viewport.height as u32);
}

struct PageSlot<R, O> {
    base: Viewport,
    state: MountState,
    raster: Option<R>,
    overlay: Option<O>,
}

impl<R: RasterSurface, O: OverlaySurface> PageSlot<R, O> {
    fn new(base: Viewport) -> Self {
        Self {
            base,
            state: MountState::Unmounted,
            raster: None,
            overlay: None,
        }
    }

    /// Drop back to Unmounted, freeing the raster and collapsing the overlay
    fn teardown(&mut self) {
        if let Some(mut raster) = self.raster.take() {
            raster.release();
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.clear();
            overlay.resize(0, 0);
        }
        self.state = MountState::Unmounted;
    }
}

pub struct RenderPipeline<R, O> {
    slots: Vec<PageSlot<R, O>>,
    /// Bumped on rescale and clear; tickets from older epochs are stale
    epoch: u64,
    next_serial: u64,
}

impl<R: RasterSurface, O: OverlaySurface> Default for RenderPipeline<R, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RasterSurface, O: OverlaySurface> RenderPipeline<R, O> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            epoch: 0,
            next_serial: 0,
        }
    }

    /// Create one slot per page from the document's base (scale 1.0)
    /// viewports. Any previous pages are torn down first.
    pub fn register_pages(&mut self, base_viewports: &[Viewport]) {
        self.clear();
        self.slots = base_viewports.iter().copied().map(PageSlot::new).collect();
    }

    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    fn slot(&self, page: u32) -> Option<&PageSlot<R, O>> {
        let index = page.checked_sub(1)? as usize;
        self.slots.get(index)
    }

    fn slot_mut(&mut self, page: u32) -> Option<&mut PageSlot<R, O>> {
        let index = page.checked_sub(1)? as usize;
        self.slots.get_mut(index)
    }

    /// Hand the overlay surface for `page` to the pipeline. It stays
    /// zero-sized until the page goes live.
    pub fn attach_overlay(&mut self, page: u32, mut overlay: O) -> Result<(), ViewerError> {
        let page_count = self.page_count();
        let slot = self
            .slot_mut(page)
            .ok_or(ViewerError::OutOfRange { page, page_count })?;

        match slot.state {
            MountState::Live { scale } => resize_overlay(&mut overlay, slot.base.scaled(scale)),
            _ => overlay.resize(0, 0),
        }
        slot.overlay = Some(overlay);
        Ok(())
    }

    pub fn overlay(&self, page: u32) -> Option<&O> {
        self.slot(page).and_then(|s| s.overlay.as_ref())
    }

    pub fn state(&self, page: u32) -> Option<MountState> {
        self.slot(page).map(|s| s.state)
    }

    pub fn is_live(&self, page: u32) -> bool {
        matches!(self.state(page), Some(MountState::Live { .. }))
    }

    pub fn live_pages(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.state, MountState::Live { .. }))
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    /// Start mounting `page`. Returns `None` if the page is unknown or
    /// already mounting or live.
    pub fn begin_mount(&mut self, page: u32, scale: f64) -> Option<MountTicket> {
        let ticket = MountTicket {
            page,
            scale,
            epoch: self.epoch,
            serial: self.next_serial,
        };

        let slot = self.slot_mut(page)?;
        if slot.state != MountState::Unmounted {
            return None;
        }
        slot.state = MountState::Mounting(ticket);
        self.next_serial += 1;

        debug!(page, scale, "mount started");
        Some(ticket)
    }

    /// Install a finished raster if its ticket is still current, otherwise
    /// release it
    pub fn complete_mount(
        &mut self,
        ticket: MountTicket,
        mut raster: R,
        current_scale: f64,
        store: &AnnotationStore,
    ) -> MountOutcome {
        let epoch = self.epoch;
        let slot = match self.slot_mut(ticket.page) {
            Some(slot) if slot.state == MountState::Mounting(ticket) => slot,
            _ => {
                raster.release();
                debug!(page = ticket.page, "discarded render for stale ticket");
                return MountOutcome::Discarded(DiscardReason::StaleTicket);
            }
        };

        if ticket.epoch != epoch || ticket.scale != current_scale {
            raster.release();
            slot.state = MountState::Unmounted;
            debug!(
                page = ticket.page,
                rendered = ticket.scale,
                current = current_scale,
                "discarded render after scale change"
            );
            return MountOutcome::Discarded(DiscardReason::ScaleChanged);
        }

        let scale = ticket.scale;
        let (width, height) = raster.size();
        slot.raster = Some(raster);
        slot.state = MountState::Live { scale };
        if let Some(overlay) = slot.overlay.as_mut() {
            resize_overlay(overlay, slot.base.scaled(scale));
            paint_strokes(overlay, store, ticket.page, scale);
        }

        debug!(page = ticket.page, scale, width, height, "page live");
        MountOutcome::Displayed
    }

    /// Record a failed or cancelled render. Returns true if the page was
    /// still waiting on this ticket.
    pub fn fail_mount(&mut self, ticket: MountTicket) -> bool {
        match self.slot_mut(ticket.page) {
            Some(slot) if slot.state == MountState::Mounting(ticket) => {
                slot.state = MountState::Unmounted;
                debug!(page = ticket.page, "render failed, page left unmounted");
                true
            }
            _ => false,
        }
    }

    /// Release `page`'s surfaces. Returns false if it was already unmounted.
    pub fn unmount(&mut self, page: u32) -> bool {
        let Some(slot) = self.slot_mut(page) else {
            return false;
        };

        match slot.state {
            MountState::Unmounted => false,
            MountState::Mounting(_) => {
                slot.state = MountState::Unmounted;
                debug!(page, "mount cancelled");
                true
            }
            MountState::Live { .. } => {
                slot.teardown();
                debug!(page, "page unmounted");
                true
            }
        }
    }

    /// Repaint the committed strokes of a live page. No-op otherwise.
    pub fn redraw_overlay(&mut self, page: u32, scale: f64, store: &AnnotationStore) -> bool {
        match self.slot_mut(page) {
            Some(PageSlot {
                state: MountState::Live { .. },
                overlay: Some(overlay),
                ..
            }) => {
                paint_strokes(overlay, store, page, scale);
                true
            }
            _ => false,
        }
    }

    /// Draw one segment of an in-progress stroke on a live page
    pub fn draw_segment(
        &mut self,
        page: u32,
        from: ScreenPoint,
        to: ScreenPoint,
        color: Rgb,
        width: f64,
    ) -> bool {
        match self.slot_mut(page) {
            Some(PageSlot {
                state: MountState::Live { .. },
                overlay: Some(overlay),
                ..
            }) => {
                overlay.stroke_polyline(&[from, to], color, width);
                true
            }
            _ => false,
        }
    }

    /// Invalidate every render for a new zoom level. All mounted pages are
    /// released; the returned pages were live and need a fresh mount.
    pub fn rescale(&mut self, scale: f64) -> Vec<u32> {
        self.epoch += 1;

        let mut was_live = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot.state {
                MountState::Unmounted => {}
                MountState::Mounting(_) => slot.state = MountState::Unmounted,
                MountState::Live { .. } => {
                    slot.teardown();
                    was_live.push(index as u32 + 1);
                }
            }
        }

        debug!(scale, released = was_live.len(), "pipeline rescaled");
        was_live
    }

    /// Release every surface and forget all pages
    pub fn clear(&mut self) {
        self.epoch += 1;
        for slot in &mut self.slots {
            slot.teardown();
        }
        self.slots.clear();
    }
}
