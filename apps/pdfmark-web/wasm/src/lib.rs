//! WASM bindings for the pdfmark viewer
//!
//! All viewer state lives in Rust inside [`PdfMarkViewer`]. JavaScript owns
//! the DOM: it creates one page container per placeholder, hands the canvases
//! to the viewer, forwards scroll and pointer events, and opens a textarea
//! whenever the viewer reports a placed note.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { PdfMarkViewer } from './pkg/pdfmark_wasm.js';
//!
//! await init();
//!
//! const viewer = new PdfMarkViewer(null);
//! const summary = await viewer.loadUrl("https://example.com/paper.pdf");
//! summary.pages.forEach((size, i) => {
//!     const page = i + 1;
//!     createContainer(page, size.width, size.height);
//!     viewer.attachOverlay(page, overlayCanvas(page));
//! });
//!
//! for (const change of viewer.updateViewport(scroller.scrollTop, scroller.clientHeight)) {
//!     if (change.Enter) viewer.mountPage(change.Enter, pageHost(change.Enter));
//! }
//!
//! const bytes = viewer.exportPdf();
//! downloadBlob(bytes, viewer.exportFilename(null));
//! ```

pub mod canvas;
pub mod fetch;
pub mod logging;
pub mod pdf_bridge;
pub mod viewer;

use wasm_bindgen::prelude::*;

pub use canvas::{CanvasOverlay, CanvasRaster};
pub use viewer::PdfMarkViewer;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    logging::init();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Document URL carried in the viewer page's query string, if any
#[wasm_bindgen]
pub fn source_url_from_query(query: &str) -> Option<String> {
    pdfmark_core::source_url_from_query(query)
}

/// Whether a top-level navigation should be redirected into the viewer
#[wasm_bindgen]
pub fn is_pdf_navigation(url: &str) -> bool {
    pdfmark_core::is_pdf_navigation(url)
}

/// Download name for an export: the requested name with `.pdf` appended when
/// missing, or `None` when the name is blank
#[wasm_bindgen]
pub fn export_filename(requested: &str) -> Option<String> {
    pdfmark_core::export_filename(requested)
}
