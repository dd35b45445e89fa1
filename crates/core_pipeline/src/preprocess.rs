//! Image preprocessing module
//!
//! Pixel-level operations used before skew detection and before handoff to
//! a recognition backend:
//! - Grayscale conversion (BT.601 luma)
//! - Otsu threshold estimation
//! - Global binarization
//! - Linear contrast/brightness enhancement
//! - Downscaling oversized photos

use crate::types::RasterImage;
use image::imageops::{self, FilterType};
use image::Rgba;
use tracing::{debug, instrument};

/// Intensity at or above which a pixel counts as light
pub const LIGHT_LEVEL: u8 = 128;

/// Replace R, G and B with the pixel's luma, keeping alpha
pub fn to_grayscale(input: &RasterImage) -> RasterImage {
    let mut output = input.clone();
    for pixel in output.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = luma(r, g, b);
        *pixel = Rgba([luma, luma, luma, a]);
    }
    output
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let value = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    value.round().clamp(0.0, 255.0) as u8
}

/// 256-bin histogram of the red channel
///
/// On a grayscale raster the red channel carries the intensity.
pub fn histogram(gray: &RasterImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    histogram
}

/// Compute the Otsu threshold of a grayscale raster
pub fn otsu_threshold(gray: &RasterImage) -> u8 {
    otsu_from_histogram(&histogram(gray))
}

/// Find the threshold maximizing between-class variance
///
/// Pixels `<= t` form the background class. The first maximum wins, and a
/// histogram with a single populated bin yields 0.
pub fn otsu_from_histogram(histogram: &[u64; 256]) -> u8 {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0f64;
    let mut weight_background = 0u64;
    let mut max_variance = 0.0f64;
    let mut threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;

        let variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if variance > max_variance {
            max_variance = variance;
            threshold = t as u8;
        }
    }

    threshold
}

/// Map intensities above `threshold` to white and the rest to black
pub fn binarize(gray: &RasterImage, threshold: u8) -> RasterImage {
    let mut output = gray.clone();
    for pixel in output.pixels_mut() {
        let value = if pixel.0[0] > threshold { 255 } else { 0 };
        pixel.0[0] = value;
        pixel.0[1] = value;
        pixel.0[2] = value;
    }
    output
}

/// Grayscale, estimate the Otsu threshold and binarize in one step
#[instrument(skip(input), fields(width = input.width(), height = input.height()))]
pub fn binarize_otsu(input: &RasterImage) -> (RasterImage, u8) {
    let gray = to_grayscale(input);
    let threshold = otsu_threshold(&gray);
    debug!(threshold, "Otsu threshold computed");
    (binarize(&gray, threshold), threshold)
}

/// Apply `(v - 128) * factor + 128 + offset` to R, G and B, clamped to 0..=255
pub fn enhance_contrast(input: &RasterImage, factor: f32, offset: f32) -> RasterImage {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let adjusted = (value as f32 - 128.0) * factor + 128.0 + offset;
        *slot = adjusted.round().clamp(0.0, 255.0) as u8;
    }

    let mut output = input.clone();
    for pixel in output.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = lut[*channel as usize];
        }
    }
    output
}

/// Scale factor needed to fit `(width, height)` inside the optional bounds
fn fit_ratio(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> f64 {
    let rx = max_width.map_or(1.0, |max| max as f64 / width as f64);
    let ry = max_height.map_or(1.0, |max| max as f64 / height as f64);
    rx.min(ry).min(1.0)
}

/// Downscale so the image fits the bounds, preserving aspect ratio
///
/// Returns `None` when the image already fits; never upscales.
pub fn downscale_to_fit(
    input: &RasterImage,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Option<RasterImage> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let ratio = fit_ratio(width, height, max_width, max_height);
    if ratio >= 1.0 {
        return None;
    }
    let new_width = ((width as f64 * ratio).floor() as u32).max(1);
    let new_height = ((height as f64 * ratio).floor() as u32).max(1);
    debug!(width, height, new_width, new_height, "Downscaling page");
    Some(imageops::resize(
        input,
        new_width,
        new_height,
        FilterType::CatmullRom,
    ))
}
