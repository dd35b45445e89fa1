//! Geometric transforms: skew rotation, content detection and cropping

use crate::error::{PipelineError, Result, Stage};
use crate::types::{ContentBounds, RasterImage};
use image::imageops;
use image::Rgba;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::{debug, instrument};

/// Rotations at or below this magnitude leave the page untouched
pub const MIN_ROTATION_DEGREES: f32 = 0.5;
/// Pixels whose mean channel value is below this count as content
pub const CONTENT_BRIGHTNESS: u32 = 250;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Canvas size that holds the whole image after rotating by `theta` radians
fn rotated_extent(width: u32, height: u32, theta: f32) -> (f32, f32) {
    let (sin, cos) = theta.sin_cos();
    let (w, h) = (width as f32, height as f32);
    (
        (w * cos).abs() + (h * sin).abs(),
        (w * sin).abs() + (h * cos).abs(),
    )
}

/// Rotate clockwise by `degrees` onto an enlarged white canvas
///
/// Rotations with `|degrees| <= 0.5` return an identical copy of the input.
/// Fails when the enlarged canvas would exceed `max_dimension` on a side.
#[instrument(skip(input), fields(width = input.width(), height = input.height()))]
pub fn rotate(input: &RasterImage, degrees: f32, max_dimension: u32) -> Result<RasterImage> {
    if degrees.abs() <= MIN_ROTATION_DEGREES {
        return Ok(input.clone());
    }
    if !degrees.is_finite() {
        return Err(PipelineError::stage(
            Stage::Rotate,
            format!("angle {} is not finite", degrees),
        ));
    }

    let (width, height) = input.dimensions();
    let theta = degrees.to_radians();
    let (extent_w, extent_h) = rotated_extent(width, height, theta);
    let (new_width, new_height) = (extent_w.ceil() as u32, extent_h.ceil() as u32);

    if new_width == 0 || new_height == 0 {
        return Err(PipelineError::stage(Stage::Rotate, "image has no pixels"));
    }
    if new_width > max_dimension || new_height > max_dimension {
        return Err(PipelineError::stage(
            Stage::Rotate,
            format!(
                "rotated canvas {}x{} exceeds the {}px limit",
                new_width, new_height, max_dimension
            ),
        ));
    }

    let projection = Projection::translate(extent_w / 2.0, extent_h / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-(width as f32) / 2.0, -(height as f32) / 2.0);

    let mut output = RasterImage::from_pixel(new_width, new_height, WHITE);
    warp_into(input, &projection, Interpolation::Bilinear, WHITE, &mut output);

    debug!(degrees, new_width, new_height, "Page rotated");
    Ok(output)
}

/// Find the tight rectangle around pixels darker than near-white
pub fn detect_content_bounds(image: &RasterImage) -> ContentBounds {
    let (width, height) = image.dimensions();
    let mut bounds = ContentBounds::empty(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, _] = pixel.0;
        let sum = r as u32 + g as u32 + b as u32;
        if sum < CONTENT_BRIGHTNESS * 3 {
            bounds.left = bounds.left.min(x);
            bounds.right = bounds.right.max(x);
            bounds.top = bounds.top.min(y);
            bounds.bottom = bounds.bottom.max(y);
        }
    }

    bounds
}

/// Crop to `bounds` grown by `margin` on every side, clamped to the image
///
/// Empty bounds return a copy of the whole image.
pub fn crop_to_bounds(image: &RasterImage, bounds: &ContentBounds, margin: u32) -> RasterImage {
    if bounds.is_empty() {
        return image.clone();
    }
    let (width, height) = image.dimensions();

    let x0 = bounds.left.saturating_sub(margin);
    let y0 = bounds.top.saturating_sub(margin);
    let x1 = bounds.right.saturating_add(1).saturating_add(margin).min(width);
    let y1 = bounds.bottom.saturating_add(1).saturating_add(margin).min(height);

    debug!(x0, y0, x1, y1, "Cropping to content");
    imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image()
}

/// Detect content and crop to it, or `None` when the page is blank
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn auto_crop(image: &RasterImage, margin: u32) -> Option<(RasterImage, ContentBounds)> {
    let bounds = detect_content_bounds(image);
    if bounds.is_empty() {
        debug!("No content detected; skipping crop");
        return None;
    }
    Some((crop_to_bounds(image, &bounds, margin), bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::binarize_otsu;
    use crate::skew::estimate_skew;
    use image::ImageBuffer;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn block_page(width: u32, height: u32, x: (u32, u32), y: (u32, u32)) -> RasterImage {
        ImageBuffer::from_fn(width, height, |px, py| {
            if (x.0..=x.1).contains(&px) && (y.0..=y.1).contains(&py) {
                BLACK
            } else {
                WHITE
            }
        })
    }

    #[test]
    fn test_small_rotation_is_noop() {
        let img = block_page(60, 40, (10, 20), (5, 30));
        for &angle in &[0.0, 0.5, -0.5, 0.3] {
            let out = rotate(&img, angle, 20_000).unwrap();
            assert_eq!(out, img);
        }
    }

    #[test]
    fn test_rotation_enlarges_canvas() {
        let img = ImageBuffer::from_pixel(100, 50, Rgba([200u8, 0, 0, 255]));
        let out = rotate(&img, 30.0, 20_000).unwrap();
        assert_eq!(out.dimensions(), (112, 94));
        assert_eq!(out.get_pixel(0, 0).0, WHITE.0);
        assert_eq!(out.get_pixel(56, 47).0, [200, 0, 0, 255]);
    }

    #[test]
    fn test_rotation_respects_canvas_limit() {
        let img = ImageBuffer::from_pixel(100, 100, WHITE);
        let result = rotate(&img, 5.0, 100);
        assert!(matches!(
            result,
            Err(PipelineError::Stage {
                stage: Stage::Rotate,
                ..
            })
        ));
    }

    #[test]
    fn test_rotation_matches_skew_convention() {
        // Vertical border rotated clockwise should measure as a positive tilt.
        let page = block_page(600, 600, (10, 13), (0, 599));
        let tilted = rotate(&page, 5.0, 20_000).unwrap();
        let (binary, _) = binarize_otsu(&tilted);
        let estimate = estimate_skew(&binary);
        assert!(
            (estimate.angle_degrees - 5.0).abs() < 0.5,
            "measured {}",
            estimate.angle_degrees
        );
    }

    #[test]
    fn test_content_bounds() {
        let img = block_page(100, 80, (40, 59), (30, 49));
        let bounds = detect_content_bounds(&img);
        assert_eq!(
            bounds,
            ContentBounds {
                left: 40,
                right: 59,
                top: 30,
                bottom: 49
            }
        );
    }

    #[test]
    fn test_content_bounds_ignores_near_white() {
        let img = ImageBuffer::from_pixel(20, 20, Rgba([251u8, 250, 249, 255]));
        assert!(detect_content_bounds(&img).is_empty());
        assert!(auto_crop(&img, 10).is_none());
    }

    #[test]
    fn test_crop_adds_margin() {
        let img = block_page(100, 80, (40, 59), (30, 49));
        let bounds = detect_content_bounds(&img);
        let cropped = crop_to_bounds(&img, &bounds, 5);
        assert_eq!(cropped.dimensions(), (30, 30));
        assert_eq!(cropped.get_pixel(4, 4).0, WHITE.0);
        assert_eq!(cropped.get_pixel(5, 5).0, BLACK.0);
        assert_eq!(cropped.get_pixel(24, 24).0, BLACK.0);
        assert_eq!(cropped.get_pixel(25, 25).0, WHITE.0);
    }

    #[test]
    fn test_crop_clamps_at_borders() {
        let img = block_page(100, 80, (2, 11), (70, 79));
        let bounds = detect_content_bounds(&img);
        let cropped = crop_to_bounds(&img, &bounds, 5);
        // x: 0..17, y: 65..80
        assert_eq!(cropped.dimensions(), (17, 15));
    }

    #[test]
    fn test_crop_of_tight_image_keeps_size() {
        let img = ImageBuffer::from_pixel(50, 40, BLACK);
        let bounds = detect_content_bounds(&img);
        let cropped = crop_to_bounds(&img, &bounds, 10);
        assert_eq!(cropped, img);
    }

    #[test]
    fn test_crop_empty_bounds_is_full_image() {
        let img = ImageBuffer::from_pixel(30, 20, WHITE);
        let cropped = crop_to_bounds(&img, &ContentBounds::empty(30, 20), 10);
        assert_eq!(cropped, img);
    }
}
