//! Integration tests for the upload-triggered preprocessing job.
//!
//! Images are generated in memory (dark horizontal bands stand in for text
//! lines) and run through the public API, mostly against the in-memory
//! store.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use ocrprep::pipeline::transform::rotate_with_fill;
use ocrprep::storage::{LocalObjectStore, MemoryObjectStore};
use ocrprep::ObjectStore;
use ocrprep::{
    derive_output_key, normalize, ObjectError, PipelineConfig, PreprocessJob, SkewSearch,
    StorageNotification, StorageObjectRef,
};
use std::io::Cursor;
use std::sync::Arc;

/// White page with dark bands every 20 px between x = 10% and 90%.
fn text_page(width: u32, height: u32) -> DynamicImage {
    let margin = width / 10;
    let img = RgbImage::from_fn(width, height, |x, y| {
        let in_line = (y % 20) < 6 && y > 10 && y + 10 < height;
        if in_line && x >= margin && x < width - margin {
            Rgb([20, 20, 20])
        } else {
            Rgb([250, 250, 250])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Same layout as [`text_page`], but opaque ink on a fully transparent
/// background.
fn transparent_page(width: u32, height: u32) -> DynamicImage {
    let margin = width / 10;
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let in_line = (y % 20) < 6 && y > 10 && y + 10 < height;
        if in_line && x >= margin && x < width - margin {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    DynamicImage::ImageRgba8(img)
}

fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn one_corrupt_upload_does_not_stop_the_batch() {
    let store = Arc::new(MemoryObjectStore::new());
    let good = StorageObjectRef::new("uploads", "public/ocr/2024/good.png");
    let bad = StorageObjectRef::new("uploads", "public/ocr/bad.png");
    store.insert(good.clone(), png_bytes(&text_page(300, 200)), "image/png");
    store.insert(bad.clone(), b"definitely not a png".to_vec(), "image/png");

    let job = PreprocessJob::new(store.clone(), PipelineConfig::default());
    let report = job
        .handle_notification(&StorageNotification::new(vec![bad.clone(), good.clone()]))
        .await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    // Notification order is preserved.
    assert_eq!(report.outcomes[0].source, bad);
    assert!(matches!(
        report.outcomes[0].result,
        Err(ObjectError::Preprocess { .. })
    ));

    let written = StorageObjectRef::new("uploads", "public/ocr-preprocessed/good.jpg");
    let stored = store.object(&written).expect("normalized variant written");
    assert_eq!(stored.content_type, "image/jpeg");
    assert_eq!(
        image::guess_format(&stored.bytes).unwrap(),
        ImageFormat::Jpeg
    );
    assert!(store
        .object(&StorageObjectRef::new("uploads", "public/ocr-preprocessed/bad.jpg"))
        .is_none());
}

#[tokio::test]
async fn job_output_is_not_an_intake_object() {
    let store = Arc::new(MemoryObjectStore::new());
    let src = StorageObjectRef::new("uploads", "public/ocr/page.png");
    store.insert(src.clone(), png_bytes(&text_page(120, 80)), "image/png");

    let job = PreprocessJob::new(store.clone(), PipelineConfig::default());
    let first = job
        .handle_notification(&StorageNotification::new(vec![src]))
        .await;
    let output = first.outcomes[0].result.as_ref().unwrap().output.clone();

    // Replaying the notification for the written object is a no-op.
    let second = job
        .handle_notification(&StorageNotification::new(vec![output]))
        .await;
    assert!(second.outcomes.is_empty());
    assert_eq!(second.ignored.len(), 1);
}

#[tokio::test]
async fn large_uploads_are_shrunk_small_ones_kept() {
    let store = Arc::new(MemoryObjectStore::new());
    let big = StorageObjectRef::new("c", "public/ocr/big.png");
    let small = StorageObjectRef::new("c", "public/ocr/small.png");
    store.insert(big.clone(), png_bytes(&text_page(600, 300)), "image/png");
    store.insert(small.clone(), png_bytes(&text_page(200, 100)), "image/png");

    let config = PipelineConfig::builder()
        .max_long_edge(400)
        .skew_range(0.0, 0.0)
        .build()
        .unwrap();
    let job = PreprocessJob::new(store.clone(), config);
    let report = job
        .handle_notification(&StorageNotification::new(vec![big, small]))
        .await;

    let big_out = report.outcomes[0].result.as_ref().unwrap();
    assert_eq!((big_out.width, big_out.height), (400, 200));
    let small_out = report.outcomes[1].result.as_ref().unwrap();
    assert_eq!((small_out.width, small_out.height), (200, 100));
}

#[test]
fn search_recovers_applied_rotation() {
    let page = text_page(400, 300);
    let tilted = rotate_with_fill(&page, 3.0);

    let estimate = SkewSearch::new(&PipelineConfig::default()).estimate(&tilted);
    assert!(
        (estimate.angle + 3.0).abs() <= 0.5,
        "expected about -3.0, got {}",
        estimate.angle
    );
    assert_eq!(estimate.candidates.len(), 21);
}

#[test]
fn normalized_output_is_binary() {
    let bytes = png_bytes(&text_page(300, 200));
    let config = PipelineConfig::default();
    let result = normalize(&bytes, 0.0, &config).unwrap();
    let decoded = image::load_from_memory(&result.bytes).unwrap().to_luma8();

    // JPEG blurs the edges; nearly every pixel should still sit at an extreme.
    let extremes = decoded
        .pixels()
        .filter(|p| p.0[0] < 40 || p.0[0] > 215)
        .count();
    let total = (decoded.width() * decoded.height()) as usize;
    assert!(extremes * 10 >= total * 8, "{extremes}/{total} near black or white");
}

#[test]
fn derives_documented_key() {
    assert_eq!(
        derive_output_key("public/ocr/abc/def.png").as_deref(),
        Some("public/ocr-preprocessed/def.jpg")
    );
    assert_eq!(
        derive_output_key("public/ocr-preprocessed/def.jpg"),
        None
    );
}

#[tokio::test]
async fn transparent_background_is_treated_as_paper() {
    let store = Arc::new(MemoryObjectStore::new());
    let src = StorageObjectRef::new("uploads", "public/ocr/scan.png");
    store.insert(src.clone(), png_bytes(&transparent_page(400, 300)), "image/png");

    let job = PreprocessJob::new(store.clone(), PipelineConfig::default());
    let report = job
        .handle_notification(&StorageNotification::new(vec![src]))
        .await;
    let done = report.outcomes[0].result.as_ref().unwrap();
    assert_eq!(done.angle, 0.0);

    let stored = store.object(&done.output).unwrap();
    let out = image::load_from_memory(&stored.bytes).unwrap().to_luma8();
    assert_eq!(out.dimensions(), (400, 300));
    assert!(out.get_pixel(0, 0)[0] > 200, "background must be white");
    assert!(out.get_pixel(200, 22)[0] < 60, "ink must stay dark");
}

#[test]
fn transparent_page_search_prefers_zero() {
    let search = SkewSearch::new(&PipelineConfig::default());
    let estimate = search.estimate(&transparent_page(400, 300));
    assert_eq!(estimate.angle, 0.0);
    assert!(estimate.score > 0.0);
}

#[tokio::test]
async fn colliding_output_keys_do_not_fail_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let page = png_bytes(&text_page(120, 80));
    let mut objects = Vec::new();
    for i in 0..16 {
        let obj = StorageObjectRef::new("uploads", format!("public/ocr/u{i}/def.png"));
        store.put(&obj, page.clone(), "image/png").await.unwrap();
        objects.push(obj);
    }

    let config = PipelineConfig::builder().concurrency(16).build().unwrap();
    let job = PreprocessJob::new(store.clone(), config);
    for _ in 0..5 {
        let report = job
            .handle_notification(&StorageNotification::new(objects.clone()))
            .await;
        let errors: Vec<String> = report.errors().map(|e| e.to_string()).collect();
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(report.succeeded(), 16);
    }

    let out_dir = dir.path().join("uploads/public/ocr-preprocessed");
    let names: Vec<_> = std::fs::read_dir(out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("def.jpg")]);
}

#[test]
fn equal_scores_resolve_to_smaller_angle() {
    // Rotations this small move no pixel across the threshold, so both
    // candidates binarize to the same buffer and score identically.
    let config = PipelineConfig::builder()
        .skew_range(-0.001, 0.001)
        .skew_step(0.002)
        .build()
        .unwrap();
    let estimate = SkewSearch::new(&config).estimate(&text_page(100, 40));

    assert_eq!(estimate.candidates.len(), 2);
    assert!(estimate.candidates[0].score > 0.0);
    assert_eq!(estimate.candidates[0].score, estimate.candidates[1].score);
    assert_eq!(estimate.angle, estimate.candidates[0].angle);
    assert!(estimate.angle < 0.0);
}
