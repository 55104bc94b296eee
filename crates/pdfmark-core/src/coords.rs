//! Coordinate transformation between screen, PDF-space and output space
//!
//! - PDF-space: page units at scale 1.0, top-left origin. All stored
//!   annotation geometry lives here.
//! - Screen space: pixels at the current zoom, top-left origin.
//! - Output space: the written PDF's own system, bottom-left origin.

use serde::{Deserialize, Serialize};

/// A point in PDF-space (scale 1.0, top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

impl PdfPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_screen(self, scale: f64) -> ScreenPoint {
        let (x, y) = to_screen(self.x, self.y, scale);
        ScreenPoint { x, y }
    }
}

/// A point in screen pixels at some scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Convert PDF-space coordinates to screen pixels at `scale`
pub fn to_screen(pdf_x: f64, pdf_y: f64, scale: f64) -> (f64, f64) {
    (pdf_x * scale, pdf_y * scale)
}

/// Convert screen pixels at `scale` back to PDF-space. `scale` must be > 0,
/// which the session's zoom clamp guarantees.
pub fn to_pdf_space(screen_x: f64, screen_y: f64, scale: f64) -> (f64, f64) {
    (screen_x / scale, screen_y / scale)
}

/// Flip a PDF-space point into output space (bottom-left origin)
pub fn to_output_space(pdf_x: f64, pdf_y: f64, page_height: f64) -> (f64, f64) {
    (pdf_x, page_height - pdf_y)
}

/// Output-space baseline for text anchored at its top-left corner.
///
/// Text operators draw from the baseline, so the anchor is moved down one
/// font size before flipping: `y = page_height - pdf_y - font_size`.
pub fn text_baseline_output(
    pdf_x: f64,
    pdf_y: f64,
    font_size: f64,
    page_height: f64,
) -> (f64, f64) {
    to_output_space(pdf_x, pdf_y + font_size, page_height)
}

/// Scale a PDF-space length (stroke width, font size) to screen pixels
pub fn scale_length(length: f64, scale: f64) -> f64 {
    length * scale
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_pdf_space(self, scale: f64) -> PdfPoint {
        let (x, y) = to_pdf_space(self.x, self.y, scale);
        PdfPoint { x, y }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn scale() -> impl Strategy<Value = f64> {
        0.01f64..10.0
    }

    fn coord() -> impl Strategy<Value = f64> {
        -5000.0f64..5000.0
    }

    proptest! {
        /// Property: PDF-space -> screen -> PDF-space returns the original point
        #[test]
        fn roundtrip_pdf_screen_pdf(x in coord(), y in coord(), s in scale()) {
            let (sx, sy) = to_screen(x, y, s);
            let (bx, by) = to_pdf_space(sx, sy, s);

            let tolerance = 1e-9 * (1.0 + x.abs().max(y.abs()));
            prop_assert!((bx - x).abs() < tolerance, "X: {} vs {}", bx, x);
            prop_assert!((by - y).abs() < tolerance, "Y: {} vs {}", by, y);
        }

        /// Property: flipping twice is the identity
        #[test]
        fn output_flip_is_involution(x in coord(), y in coord(), h in 1.0f64..5000.0) {
            let (ox, oy) = to_output_space(x, y, h);
            let (bx, by) = to_output_space(ox, oy, h);
            prop_assert!((bx - x).abs() < 1e-9);
            prop_assert!((by - y).abs() < 1e-6);
        }

        /// Property: screen positions scale linearly
        #[test]
        fn linear_scaling(x in coord(), s in scale()) {
            let (single, _) = to_screen(x, 0.0, s);
            let (double, _) = to_screen(x, 0.0, s * 2.0);
            prop_assert!((double - 2.0 * single).abs() < 1e-6 * (1.0 + single.abs()));
        }
    }
}
