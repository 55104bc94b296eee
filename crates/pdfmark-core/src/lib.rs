//! PDF viewing with text notes and ink strokes
//!
//! This crate holds everything that does not touch the browser: document
//! geometry, the annotation store, page visibility and mount bookkeeping,
//! input dispatch, and flattening annotations into an exported PDF with lopdf.
//! Platform code provides the page and overlay surfaces through the traits in
//! [`render`].

pub mod annotations;
pub mod color;
pub mod config;
pub mod coords;
pub mod document;
pub mod error;
pub mod export;
pub mod render;
pub mod session;
pub mod source;
pub mod visibility;

pub use annotations::{
    Annotation, AnnotationId, AnnotationStore, InkStroke, StrokeBuilder, TextAnnotation,
    TextCommit,
};
pub use color::Rgb;
pub use config::{ToolSettings, ViewerConfig};
pub use coords::{PdfPoint, ScreenPoint};
pub use document::{DocumentInfo, PageDescriptor, PdfDocument, Viewport};
pub use error::{ExportError, ViewerError};
pub use export::{export_filename, export_pdf};
pub use render::{
    DiscardReason, MountOutcome, MountState, MountTicket, OverlaySurface, RasterSurface,
    RenderPipeline, TextPlacement,
};
pub use session::{DocumentSummary, Effect, InputEvent, Mode, ViewerSession, ZoomOutcome};
pub use source::{is_pdf_navigation, source_url_from_query, validate_source_url};
pub use visibility::{PageLayout, ViewportWindow, VisibilityChange, VisibilityController};
