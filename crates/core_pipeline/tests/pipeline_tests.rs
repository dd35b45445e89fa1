//! End-to-end tests over the public pipeline API

use core_pipeline::decoder::{decode_data_url, encode_png};
use core_pipeline::geometry;
use core_pipeline::{
    AngleSource, FailurePolicy, ImageSource, Pipeline, PipelineConfig, PipelineError, RasterImage,
};
use image::{ImageBuffer, Rgba};
use std::fs;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([35, 30, 40, 255]);

/// A BOM-like sheet: ruled left border, designator column, value column
fn bom_sheet() -> RasterImage {
    ImageBuffer::from_fn(800, 700, |x, y| {
        let border = (60..64).contains(&x) && (30..670).contains(&y);
        let row = y % 45;
        let designator = (90..180).contains(&x) && (10..22).contains(&row) && (50..650).contains(&y);
        let value = (260..520).contains(&x) && (12..20).contains(&row) && (50..650).contains(&y);
        if border || designator || value {
            INK
        } else {
            WHITE
        }
    })
}

fn photographed(degrees: f32) -> RasterImage {
    geometry::rotate(&bom_sheet(), degrees, 20_000).unwrap()
}

#[test]
fn test_png_file_roundtrip_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page1.png");
    fs::write(&path, encode_png(&photographed(-3.0)).unwrap()).unwrap();

    let bytes = fs::read(&path).unwrap();
    let pipeline = Pipeline::default();
    let normalized = pipeline.process_strict(&ImageSource::Bytes(bytes)).unwrap();

    assert!(normalized.data_url.starts_with("data:image/png;base64,"));
    assert_eq!(normalized.extension(), "png");
    let report = &normalized.report;
    assert_eq!(report.angle_source, AngleSource::Estimated);
    let skew = report.skew.unwrap();
    assert!((skew.angle_degrees + 3.0).abs() < 0.5, "{:?}", skew);

    let out_path = dir.path().join("page1.normalized.png");
    fs::write(&out_path, normalized.payload_bytes().unwrap()).unwrap();
    let reloaded = image::open(&out_path).unwrap();
    assert_eq!(reloaded.width(), normalized.width);
    assert_eq!(reloaded.height(), normalized.height);
}

#[test]
fn test_normalized_page_is_upright() {
    let pipeline = Pipeline::new(PipelineConfig {
        enhance_contrast: false,
        ..Default::default()
    })
    .unwrap();

    let (upright, report) = pipeline.normalize_raster(photographed(6.0)).unwrap();
    assert!(report.rotation_degrees.is_some());

    // A second pass over the corrected page finds nothing left to rotate.
    let (_, second) = pipeline.normalize_raster(upright).unwrap();
    let residual = second.skew.unwrap().angle_degrees;
    assert!(residual.abs() <= 0.5, "residual skew {}", residual);
    assert_eq!(second.rotation_degrees, None);
}

#[test]
fn test_straight_sheet_is_not_rotated() {
    let pipeline = Pipeline::default();
    let (_, report) = pipeline.normalize_raster(bom_sheet()).unwrap();
    assert!(report.skew.unwrap().angle_degrees.abs() < 0.1);
    assert_eq!(report.rotation_degrees, None);

    let crop = report.crop.unwrap();
    assert_eq!((crop.left, crop.top), (60, 30));
}

#[test]
fn test_policies_differ_only_on_stage_failure() {
    let config = PipelineConfig {
        rotation_angle_override: Some(4.0),
        max_canvas_dimension: 800,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config).unwrap();
    let input = ImageSource::Raster(bom_sheet());

    let degraded = pipeline.process(&input, FailurePolicy::BestEffort).unwrap();
    assert!(degraded.is_degraded());
    assert_eq!(decode_data_url(&degraded.data_url).unwrap(), bom_sheet());

    let strict = pipeline.process(&input, FailurePolicy::Strict);
    assert!(matches!(strict, Err(PipelineError::Stage { .. })));
}

#[test]
fn test_config_file_drives_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.json");
    fs::write(
        &path,
        r#"{ "autoRotate": false, "autoCrop": true, "enhanceContrast": false, "cropMargin": 0 }"#,
    )
    .unwrap();

    let config = PipelineConfig::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
    let pipeline = Pipeline::new(config).unwrap();
    let (out, report) = pipeline.normalize_raster(bom_sheet()).unwrap();

    assert_eq!(report.angle_source, AngleSource::Disabled);
    let crop = report.crop.unwrap();
    assert_eq!(out.width(), crop.width());
    assert_eq!(out.height(), crop.height());
}
