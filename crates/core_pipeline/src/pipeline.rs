//! Page normalization orchestrator
//!
//! Runs the stages in their fixed order (downscale, skew correction, crop,
//! enhancement), each gated by [`PipelineConfig`], then re-encodes the page
//! as a PNG data URL. A [`FailurePolicy`] decides what a stage failure does:
//! best-effort hands back the caller's original input, strict returns the
//! error.
//!
//! `Pipeline` holds only its configuration. Every stage allocates its own
//! output buffer, so one instance can serve concurrent callers.

use crate::decoder::encode_png_data_url;
use crate::error::Result;
use crate::geometry::{self, MIN_ROTATION_DEGREES};
use crate::preprocess::{self, binarize_otsu};
use crate::skew::estimate_skew;
use crate::types::{
    AngleSource, FailurePolicy, ImageSource, NormalizedImage, PipelineConfig, RasterImage,
    StageReport,
};
use tracing::{debug, info, instrument, warn};

/// Configured normalization pipeline
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validate the configuration and build a pipeline
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize one image, substituting the original input on stage failure
    pub fn process_best_effort(&self, source: &ImageSource) -> Result<NormalizedImage> {
        self.process(source, FailurePolicy::BestEffort)
    }

    /// Normalize one image, propagating any failure
    pub fn process_strict(&self, source: &ImageSource) -> Result<NormalizedImage> {
        self.process(source, FailurePolicy::Strict)
    }

    /// Decode, normalize and re-encode one image under `policy`
    ///
    /// Decode failures are returned under either policy since there is no
    /// image to fall back on.
    #[instrument(skip(self, source))]
    pub fn process(&self, source: &ImageSource, policy: FailurePolicy) -> Result<NormalizedImage> {
        let raster = source.decode()?;
        let (width, height) = raster.dimensions();
        info!(width, height, "Normalizing page");

        let outcome = self
            .normalize_raster(raster)
            .and_then(|(image, report)| Self::encode(image, report));

        match outcome {
            Ok(normalized) => Ok(normalized),
            Err(err) if policy == FailurePolicy::BestEffort && err.is_recoverable() => {
                warn!(error = %err, "Normalization failed; returning original image");
                let mut report = StageReport::new(width, height);
                report.degraded = Some(err.to_string());
                Ok(NormalizedImage {
                    data_url: source.to_data_url()?,
                    width,
                    height,
                    report,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Run every enabled stage over a decoded raster
    pub fn normalize_raster(&self, image: RasterImage) -> Result<(RasterImage, StageReport)> {
        let config = &self.config;
        let (width, height) = image.dimensions();
        let mut report = StageReport::new(width, height);
        let mut image = image;

        if let Some(scaled) =
            preprocess::downscale_to_fit(&image, config.max_width, config.max_height)
        {
            image = scaled;
            report.downscaled = true;
        }

        let skew = match config.rotation_angle_override {
            Some(angle) => {
                report.angle_source = AngleSource::Override;
                angle
            }
            None if config.auto_rotate => {
                let (binary, _) = binarize_otsu(&image);
                let estimate = estimate_skew(&binary);
                report.angle_source = AngleSource::Estimated;
                report.skew = Some(estimate);
                estimate.angle_degrees
            }
            None => 0.0,
        };

        if skew.abs() > MIN_ROTATION_DEGREES {
            image = geometry::rotate(&image, -skew, config.max_canvas_dimension)?;
            report.rotation_degrees = Some(-skew);
            info!(skew, "Skew corrected");
        } else {
            debug!(skew, "Page already upright");
        }

        if config.auto_crop {
            if let Some((cropped, bounds)) = geometry::auto_crop(&image, config.crop_margin) {
                info!(
                    left = bounds.left,
                    right = bounds.right,
                    top = bounds.top,
                    bottom = bounds.bottom,
                    "Cropped to content"
                );
                image = cropped;
                report.crop = Some(bounds);
            }
        }

        if config.enhance_contrast {
            let gray = preprocess::to_grayscale(&image);
            image = preprocess::enhance_contrast(
                &gray,
                config.contrast_factor,
                config.brightness_offset,
            );
            if config.binarize_after_enhance {
                let threshold = preprocess::otsu_threshold(&image);
                image = preprocess::binarize(&image, threshold);
                report.threshold = Some(threshold);
            }
            report.enhanced = true;
        }

        Ok((image, report))
    }

    fn encode(image: RasterImage, report: StageReport) -> Result<NormalizedImage> {
        let (width, height) = image.dimensions();
        Ok(NormalizedImage {
            data_url: encode_png_data_url(&image)?,
            width,
            height,
            report,
        })
    }
}
