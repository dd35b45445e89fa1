//! Skew estimation from the page's left edge
//!
//! A photographed bill-of-materials sheet has a ruled left border or a
//! column of designators whose left boundary is a straight line. Sampling
//! that boundary every few rows and fitting a line through the samples gives
//! the page tilt.

use crate::preprocess::LIGHT_LEVEL;
use crate::types::{EdgePoint, LineFit, RasterImage, SkewEstimate};
use tracing::{debug, instrument};

/// Row stride between edge samples
pub const ROW_STEP: u32 = 5;
/// Widest band scanned from the left border, in pixels
pub const MAX_BAND_WIDTH: u32 = 150;
/// Fewest samples (before and after filtering) worth fitting
pub const MIN_SAMPLES: usize = 10;
/// Largest tilt reported, in degrees
pub const MAX_SKEW_DEGREES: f64 = 10.0;
/// MAD used when the samples have no spread at all
const MAD_FLOOR: u32 = 10;

/// Width of the left-hand band searched for the page edge
pub fn band_width(width: u32) -> u32 {
    ((width as f64 * 0.15).floor() as u32).min(MAX_BAND_WIDTH)
}

/// Sample the left content edge of a binarized raster
///
/// For every fifth row the band is scanned left to right for the first
/// dark-to-light transition; rows without one fall back to their first dark
/// pixel, and rows with neither are skipped.
pub fn sample_left_edge(binary: &RasterImage) -> Vec<EdgePoint> {
    let (width, height) = binary.dimensions();
    let band = band_width(width).min(width);
    let mut points = Vec::with_capacity((height / ROW_STEP + 1) as usize);

    for y in (0..height).step_by(ROW_STEP as usize) {
        let intensity = |x: u32| binary.get_pixel(x, y).0[0];

        let transition =
            (1..band).find(|&x| intensity(x - 1) < LIGHT_LEVEL && intensity(x) >= LIGHT_LEVEL);
        let edge = transition.or_else(|| (0..band).find(|&x| intensity(x) < LIGHT_LEVEL));

        if let Some(x) = edge {
            points.push(EdgePoint::new(x, y));
        }
    }

    points
}

fn median(sorted: &[u32]) -> u32 {
    sorted[sorted.len() / 2]
}

/// Drop samples whose column is far from the median column
///
/// Keeps points with `|x - median| <= 3 * MAD`, where a zero MAD is
/// replaced by 10. Inputs shorter than [`MIN_SAMPLES`] are returned as is.
pub fn filter_outliers(points: &[EdgePoint]) -> Vec<EdgePoint> {
    if points.len() < MIN_SAMPLES {
        return points.to_vec();
    }

    let mut xs: Vec<u32> = points.iter().map(|p| p.x).collect();
    xs.sort_unstable();
    let median_x = median(&xs);

    let mut deviations: Vec<u32> = xs.iter().map(|&x| x.abs_diff(median_x)).collect();
    deviations.sort_unstable();
    let mad = match median(&deviations) {
        0 => MAD_FLOOR,
        mad => mad,
    };
    let limit = 3 * mad;
    debug!(median_x, mad, limit, "Outlier filter bounds");

    points
        .iter()
        .copied()
        .filter(|p| p.x.abs_diff(median_x) <= limit)
        .collect()
}

/// Ordinary least-squares fit of `x = slope * y + intercept`
///
/// Returns `None` when all samples share one row.
pub fn fit_line(points: &[EdgePoint]) -> Option<LineFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_y2) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for p in points {
        let (x, y) = (p.x as f64, p.y as f64);
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_y2 += y * y;
    }

    let denominator = n * sum_y2 - sum_y * sum_y;
    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_x - slope * sum_y) / n;

    // A clockwise page tilt moves the edge left as y grows.
    let angle_degrees = (-slope)
        .atan()
        .to_degrees()
        .clamp(-MAX_SKEW_DEGREES, MAX_SKEW_DEGREES);

    Some(LineFit {
        slope,
        intercept,
        angle_degrees,
    })
}

/// Estimate the clockwise page tilt from edge samples
///
/// Too few samples, before or after filtering, means no measurable skew
/// and yields an angle of 0.
pub fn estimate_from_points(points: &[EdgePoint]) -> SkewEstimate {
    let samples = points.len();
    if samples < MIN_SAMPLES {
        debug!(samples, "Too few edge samples to estimate skew");
        return SkewEstimate::none(samples, 0);
    }

    let inliers = filter_outliers(points);
    if inliers.len() < MIN_SAMPLES {
        debug!(samples, inliers = inliers.len(), "Too few inliers to estimate skew");
        return SkewEstimate::none(samples, inliers.len());
    }

    match fit_line(&inliers) {
        Some(fit) => SkewEstimate {
            angle_degrees: fit.angle_degrees as f32,
            samples,
            inliers: inliers.len(),
        },
        None => SkewEstimate::none(samples, inliers.len()),
    }
}

/// Sample the left edge of a binarized raster and estimate its tilt
#[instrument(skip(binary), fields(width = binary.width(), height = binary.height()))]
pub fn estimate_skew(binary: &RasterImage) -> SkewEstimate {
    let points = sample_left_edge(binary);
    let estimate = estimate_from_points(&points);
    debug!(
        samples = estimate.samples,
        inliers = estimate.inliers,
        angle = estimate.angle_degrees,
        "Skew estimated"
    );
    estimate
}
