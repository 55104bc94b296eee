//! Canvas-backed page surfaces
//!
//! [`CanvasRaster`] holds the bitmap pdf.js painted for a page. Every mount
//! gets a detached canvas of its own, which only enters the page's host
//! element once the render is displayed; [`CanvasOverlay`] is the
//! transparent canvas stacked on top of it that carries ink strokes.

use pdfmark_core::{OverlaySurface, RasterSurface, Rgb, ScreenPoint};
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

/// Create a detached `<canvas>` in the current document
pub fn create_canvas() -> Result<HtmlCanvasElement, String> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| "no document to create a canvas in".to_string())?;
    document
        .create_element("canvas")
        .map_err(|_| "document refused to create a canvas".to_string())?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| "created element is not a canvas".to_string())
}

pub struct CanvasRaster {
    canvas: HtmlCanvasElement,
}

impl CanvasRaster {
    pub fn new(canvas: HtmlCanvasElement) -> Self {
        Self { canvas }
    }

    /// A raster backed by a fresh detached canvas
    pub fn create() -> Result<Self, String> {
        create_canvas().map(Self::new)
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl RasterSurface for CanvasRaster {
    fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    /// Zero-sizing a canvas frees its backing store
    fn release(&mut self) {
        self.canvas.set_width(0);
        self.canvas.set_height(0);
        self.canvas.remove();
    }
}

pub struct CanvasOverlay {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasOverlay {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, String> {
        let context = canvas
            .get_context("2d")
            .map_err(|_| "overlay canvas refused a 2d context".to_string())?
            .ok_or_else(|| "overlay canvas has no 2d context".to_string())?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| "unexpected overlay context type".to_string())?;
        Ok(Self { canvas, context })
    }
}

impl OverlaySurface for CanvasOverlay {
    fn resize(&mut self, width: u32, height: u32) {
        // Assigning a dimension clears the canvas even when it is unchanged
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    fn clear(&mut self) {
        self.context.clear_rect(
            0.0,
            0.0,
            self.canvas.width() as f64,
            self.canvas.height() as f64,
        );
    }

    fn stroke_polyline(&mut self, points: &[ScreenPoint], color: Rgb, width: f64) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        if rest.is_empty() {
            return;
        }

        let ctx = &self.context;
        ctx.set_stroke_style_str(&color.to_hex());
        ctx.set_line_width(width);
        ctx.set_line_cap("round");
        ctx.set_line_join("round");
        ctx.begin_path();
        ctx.move_to(first.x, first.y);
        for point in rest {
            ctx.line_to(point.x, point.y);
        }
        ctx.stroke();
    }
}
