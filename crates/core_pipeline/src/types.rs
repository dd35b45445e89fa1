//! Core types for the bomscan normalization pipeline
//!
//! This module defines the pixel buffer representation, the intermediate
//! values produced by skew estimation and content detection, the pipeline
//! configuration, and the shapes exchanged with recognition backends.

use crate::error::{PipelineError, Result};
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};

/// Type alias for an RGBA pixel buffer (4 interleaved 8-bit channels, row-major)
pub type RasterImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Build a raster from a raw RGBA buffer, rejecting mismatched lengths
pub fn raster_from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<RasterImage> {
    let expected = width as usize * height as usize * 4;
    if data.len() != expected {
        return Err(PipelineError::Decode(format!(
            "pixel buffer holds {} bytes, expected {} for {}x{} RGBA",
            data.len(),
            expected,
            width,
            height
        )));
    }
    ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| PipelineError::Decode("pixel buffer rejected".to_string()))
}

/// A detected background/content transition at a sampled row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePoint {
    pub x: u32,
    pub y: u32,
}

impl EdgePoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Least-squares fit of edge column against row: `x = slope * y + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Clockwise tilt of the edge in degrees, clamped to [-10, 10]
    pub angle_degrees: f64,
}

/// Outcome of skew estimation over one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkewEstimate {
    /// Clockwise page tilt in degrees; 0 when the signal was insufficient
    pub angle_degrees: f32,
    /// Edge samples found by the scanner
    pub samples: usize,
    /// Samples surviving the outlier filter
    pub inliers: usize,
}

impl SkewEstimate {
    pub fn none(samples: usize, inliers: usize) -> Self {
        Self {
            angle_degrees: 0.0,
            samples,
            inliers,
        }
    }
}

/// Tight rectangle around non-background pixels (inclusive edges)
///
/// An empty result is encoded as `left == width, right == 0`; use
/// [`ContentBounds::is_empty`] rather than inspecting the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBounds {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl ContentBounds {
    /// The "nothing detected" value for an image of the given size
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            left: width,
            right: 0,
            top: height,
            bottom: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.top > self.bottom
    }

    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.right - self.left + 1
        }
    }

    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.bottom - self.top + 1
        }
    }
}

/// Options controlling which pipeline stages run
///
/// Keys are camelCase in JSON; omitted keys take their defaults and
/// unrecognized keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Estimate and cancel page skew
    pub auto_rotate: bool,
    /// Crop to detected content plus `crop_margin`
    pub auto_crop: bool,
    /// Apply the contrast enhancer before handoff
    pub enhance_contrast: bool,
    /// Skew in degrees used instead of estimation
    pub rotation_angle_override: Option<f32>,
    /// Margin kept around detected content, in pixels
    pub crop_margin: u32,
    pub contrast_factor: f32,
    pub brightness_offset: f32,
    /// Re-binarize with Otsu after enhancement
    pub binarize_after_enhance: bool,
    /// Downscale so the page fits within these bounds before geometry stages
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Largest surface side the pipeline is allowed to allocate
    pub max_canvas_dimension: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_rotate: true,
            auto_crop: true,
            enhance_contrast: true,
            rotation_angle_override: None,
            crop_margin: 10,
            contrast_factor: 1.5,
            brightness_offset: 15.0,
            binarize_after_enhance: true,
            max_width: None,
            max_height: None,
            max_canvas_dimension: 20_000,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON options object and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| PipelineError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !self.contrast_factor.is_finite() || self.contrast_factor < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "contrastFactor must be a finite non-negative number, got {}",
                self.contrast_factor
            )));
        }
        if !self.brightness_offset.is_finite() {
            return Err(PipelineError::InvalidConfig(
                "brightnessOffset must be finite".to_string(),
            ));
        }
        if let Some(angle) = self.rotation_angle_override {
            if !angle.is_finite() {
                return Err(PipelineError::InvalidConfig(
                    "rotationAngleOverride must be finite".to_string(),
                ));
            }
        }
        if self.max_width == Some(0) || self.max_height == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "maxWidth/maxHeight must be greater than zero".to_string(),
            ));
        }
        if self.max_canvas_dimension == 0 {
            return Err(PipelineError::InvalidConfig(
                "maxCanvasDimension must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the orchestrator does when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Return the original input unchanged
    BestEffort,
    /// Propagate the error to the caller
    Strict,
}

/// An image handed to the pipeline
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Embedded `data:<mime>;base64,<payload>` string
    DataUrl(String),
    /// Encoded file contents (PNG, JPEG, ...)
    Bytes(Vec<u8>),
    /// Already-decoded pixels
    Raster(RasterImage),
}

impl From<RasterImage> for ImageSource {
    fn from(image: RasterImage) -> Self {
        Self::Raster(image)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Where the skew angle used for rotation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleSource {
    Estimated,
    Override,
    Disabled,
}

/// Record of what the pipeline did to one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub original_dimensions: (u32, u32),
    pub downscaled: bool,
    pub angle_source: AngleSource,
    pub skew: Option<SkewEstimate>,
    /// Rotation actually applied, in degrees (negated skew)
    pub rotation_degrees: Option<f32>,
    pub crop: Option<ContentBounds>,
    pub enhanced: bool,
    pub threshold: Option<u8>,
    /// Set when the best-effort policy returned the original input
    pub degraded: Option<String>,
}

impl StageReport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            original_dimensions: (width, height),
            downscaled: false,
            angle_source: AngleSource::Disabled,
            skew: None,
            rotation_degrees: None,
            crop: None,
            enhanced: false,
            threshold: None,
            degraded: None,
        }
    }
}

/// Final page in embedded-payload form, ready for a recognition backend
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub report: StageReport,
}

impl NormalizedImage {
    pub fn is_degraded(&self) -> bool {
        self.report.degraded.is_some()
    }
}

/// Word-level bounding box reported by a recognition backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

/// A recognized word
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizedWord {
    pub text: String,
    pub bbox: WordBox,
    pub confidence: f32,
}

/// Output of a recognition backend for one page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionResult {
    pub text: String,
    pub words: Vec<RecognizedWord>,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert!(config.auto_rotate);
        assert!(config.auto_crop);
        assert!(config.enhance_contrast);
        assert_eq!(config.rotation_angle_override, None);
        assert_eq!(config.crop_margin, 10);
    }

    #[test]
    fn test_config_from_json_ignores_unknown_keys() {
        let config =
            PipelineConfig::from_json(r#"{"autoCrop": false, "cropMargin": 20, "sharpen": true}"#)
                .unwrap();
        assert!(!config.auto_crop);
        assert_eq!(config.crop_margin, 20);
        assert!(config.auto_rotate);
    }

    #[test]
    fn test_config_override_parses() {
        let config = PipelineConfig::from_json(r#"{"rotationAngleOverride": -3.5}"#).unwrap();
        assert_eq!(config.rotation_angle_override, Some(-3.5));
    }

    #[test]
    fn test_config_rejects_zero_canvas_limit() {
        let result = PipelineConfig::from_json(r#"{"maxCanvasDimension": 0}"#);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_rejects_negative_contrast() {
        let config = PipelineConfig {
            contrast_factor: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_content_bounds_empty() {
        let bounds = ContentBounds::empty(40, 30);
        assert!(bounds.is_empty());
        assert_eq!(bounds.width(), 0);
        assert_eq!(bounds.height(), 0);

        let bounds = ContentBounds {
            left: 5,
            right: 5,
            top: 2,
            bottom: 4,
        };
        assert!(!bounds.is_empty());
        assert_eq!(bounds.width(), 1);
        assert_eq!(bounds.height(), 3);
    }

    #[test]
    fn test_raster_from_raw_length_check() {
        assert!(raster_from_raw(2, 2, vec![0u8; 15]).is_err());
        let img = raster_from_raw(2, 2, vec![7u8; 16]).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn test_recognition_result_missing_fields() {
        let result: RecognitionResult = serde_json::from_str(r#"{"text": "R101 C22"}"#).unwrap();
        assert_eq!(result.text, "R101 C22");
        assert!(result.words.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_failure_policy_serialization() {
        let json = serde_json::to_string(&FailurePolicy::BestEffort).unwrap();
        assert_eq!(json, "\"best-effort\"");
    }
}
