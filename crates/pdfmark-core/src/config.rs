//! Viewer configuration
//!
//! Every field has a default, so a partial JSON object (or none at all) is a
//! valid configuration.

use crate::color::Rgb;
use crate::error::ViewerError;
use serde::{Deserialize, Serialize};

/// Tool settings supplied by the toolbar at the moment a note or stroke starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub stroke_color: Rgb,
    /// Ink width in PDF-space units
    pub stroke_width: f64,
    pub text_color: Rgb,
    /// Note font size in PDF-space units
    pub font_size: f64,
}

impl ToolSettings {
    /// Widths and sizes must be finite and positive; they end up as operands
    /// in the exported content stream
    pub fn validate(&self) -> Result<(), ViewerError> {
        if positive(self.stroke_width) && positive(self.font_size) {
            Ok(())
        } else {
            Err(ViewerError::Config(format!(
                "stroke width and font size must be positive (got {} and {})",
                self.stroke_width, self.font_size
            )))
        }
    }
}

/// Finite and greater than zero. NaN fails.
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            stroke_color: Rgb::RED,
            stroke_width: 2.0,
            text_color: Rgb::BLACK,
            font_size: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub initial_scale: f64,
    /// Increment used by the zoom in/out buttons
    pub zoom_step: f64,
    /// Preload distance in viewport heights above and below the visible area
    pub preload_margin: f64,
    /// Vertical gap between page placeholders, in pixels
    pub page_gap: f64,
    pub default_export_name: String,
    /// URL schemes the viewer will fetch documents from
    pub allowed_schemes: Vec<String>,
    /// Keep the current document when a replacement fails to parse
    pub preserve_on_failed_load: bool,
    pub tools: ToolSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 3.0,
            initial_scale: 1.0,
            zoom_step: 0.2,
            preload_margin: 1.0,
            page_gap: 10.0,
            default_export_name: "annotated.pdf".to_string(),
            allowed_schemes: vec!["http".to_string(), "https".to_string(), "file".to_string()],
            preserve_on_failed_load: false,
            tools: ToolSettings::default(),
        }
    }
}

impl ViewerConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ViewerError> {
        let config: ViewerConfig =
            serde_json::from_str(json).map_err(|e| ViewerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if !(positive(self.min_scale) && positive(self.max_scale))
            || self.max_scale < self.min_scale
        {
            return Err(ViewerError::Config(format!(
                "scale bounds must satisfy 0 < min <= max (got {}..{})",
                self.min_scale, self.max_scale
            )));
        }
        if !(self.min_scale..=self.max_scale).contains(&self.initial_scale) {
            return Err(ViewerError::Config(format!(
                "initial scale {} is outside {}..{}",
                self.initial_scale, self.min_scale, self.max_scale
            )));
        }
        if !positive(self.zoom_step) {
            return Err(ViewerError::Config("zoom step must be positive".to_string()));
        }
        if !(non_negative(self.preload_margin) && non_negative(self.page_gap)) {
            return Err(ViewerError::Config(
                "preload margin and page gap must not be negative".to_string(),
            ));
        }
        self.tools.validate()
    }

    /// Clamp a requested scale into the configured bounds
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_scale, 0.5);
        assert_eq!(config.max_scale, 3.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            ViewerConfig::from_json(r##"{"zoom_step":0.25,"tools":{"stroke_color":"#0000ff"}}"##)
                .unwrap();
        assert_eq!(config.zoom_step, 0.25);
        assert_eq!(config.tools.stroke_color, Rgb::new(0, 0, 255));
        assert_eq!(config.tools.font_size, 16.0);
        assert_eq!(config.default_export_name, "annotated.pdf");
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(ViewerConfig::from_json("{}").unwrap(), ViewerConfig::default());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = ViewerConfig::from_json(r#"{"min_scale":2.0,"max_scale":1.0}"#).unwrap_err();
        assert!(matches!(err, ViewerError::Config(_)));
    }

    #[test]
    fn test_rejects_initial_scale_outside_bounds() {
        assert!(ViewerConfig::from_json(r#"{"initial_scale":4.0}"#).is_err());
    }

    #[test]
    fn test_rejects_bad_color() {
        assert!(ViewerConfig::from_json(r#"{"tools":{"text_color":"red"}}"#).is_err());
    }

    #[test]
    fn test_tools_reject_non_finite_sizes() {
        for (stroke_width, font_size) in [
            (f64::NAN, 16.0),
            (2.0, f64::NAN),
            (f64::INFINITY, 16.0),
            (2.0, 0.0),
            (-1.0, 16.0),
        ] {
            let tools = ToolSettings {
                stroke_width,
                font_size,
                ..ToolSettings::default()
            };
            assert!(
                matches!(tools.validate(), Err(ViewerError::Config(_))),
                "{} {}",
                stroke_width,
                font_size
            );
        }
        assert!(ToolSettings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_finite_scale_settings() {
        let config = ViewerConfig {
            zoom_step: f64::NAN,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ViewerConfig {
            max_scale: f64::INFINITY,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamp_scale() {
        let config = ViewerConfig::default();
        assert_eq!(config.clamp_scale(0.1), 0.5);
        assert_eq!(config.clamp_scale(9.0), 3.0);
        assert_eq!(config.clamp_scale(1.4), 1.4);
    }
}
