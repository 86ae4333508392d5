//! End-to-end pipeline tests against the built-in model
//!
//! Covers the observable contract of `generate`:
//! 1. Range violations and oversized payloads are rejected before any image work
//! 2. A not-ready context answers with the fixed message and does no work
//! 3. Successful responses carry a valid GLB and, when asked, a PNG preview
//! 4. `bakeTexture` decides between vertex colours and a baked texture

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use photomesh::mesh::inspect_glb;
use photomesh::model::{ModelError, SceneCode};
use photomesh::preprocess::{self, PreprocessError, GRAY_FILL_U8};
use photomesh::{
    generate, BorderSegmenter, Device, GenerateRequest, LoadedModel, Outcome, PipelineConfig,
    ReconstructionModel, Rejection, RequestState, Segmenter, ServiceContext, SilhouetteHullModel,
    NOT_READY_MESSAGE,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps the built-in model and counts encoder calls
struct CountingModel {
    inner: SilhouetteHullModel,
    encodes: AtomicUsize,
}

impl ReconstructionModel for CountingModel {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn supports_device(&self, device: &Device) -> bool {
        self.inner.supports_device(device)
    }

    fn encode(&self, image: &RgbImage, device: &Device) -> Result<SceneCode, ModelError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(image, device)
    }

    fn query_density(&self, scene: &SceneCode, points: &[glam::Vec3]) -> Result<Vec<f32>, ModelError> {
        self.inner.query_density(scene, points)
    }

    fn query_color(&self, scene: &SceneCode, points: &[glam::Vec3]) -> Result<Vec<glam::Vec3>, ModelError> {
        self.inner.query_color(scene, points)
    }
}

/// Counts segmentation calls
#[derive(Default)]
struct CountingSegmenter {
    inner: BorderSegmenter,
    calls: AtomicUsize,
}

impl Segmenter for CountingSegmenter {
    fn name(&self) -> &str {
        "counting"
    }

    fn segment(&self, image: &RgbImage) -> Result<image::GrayImage, PreprocessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.segment(image)
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_default_mc_resolution(64)
        .with_preview_size(32)
}

fn ready_context() -> ServiceContext {
    let context = ServiceContext::new(config());
    context
        .install(LoadedModel::new(
            Arc::new(SilhouetteHullModel::default()),
            Device::Cpu,
            Arc::new(BorderSegmenter::default()),
        ))
        .unwrap();
    context
}

fn encode(image: &DynamicImage, format: ImageFormat) -> String {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    STANDARD.encode(bytes)
}

/// Orange block on mid-gray
fn subject_png() -> String {
    let image = RgbImage::from_fn(48, 48, |x, y| {
        if (12..36).contains(&x) && (8..40).contains(&y) {
            Rgb([230, 120, 30])
        } else {
            Rgb([127, 127, 127])
        }
    });
    encode(&DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

fn response(outcome: &Outcome) -> &photomesh::GenerateResponse {
    outcome.response().expect("expected a response body")
}

#[test]
fn test_small_image_with_preview_succeeds() {
    let request = GenerateRequest::new(subject_png()).with_return_preview(true);
    let report = generate(&ready_context(), &request);

    let response = response(&report.outcome);
    assert!(response.success, "error: {:?}", response.error);
    assert!(response.is_well_formed());
    assert!(!response.glb_base64.as_deref().unwrap().is_empty());
    assert!(!response.preview_png_base64.as_deref().unwrap().is_empty());
    assert!(response.processing_time_ms.is_some());

    let preview = STANDARD
        .decode(response.preview_png_base64.as_deref().unwrap())
        .unwrap();
    let preview = image::load_from_memory(&preview).unwrap();
    assert_eq!((preview.width(), preview.height()), (32, 32));
}

#[test]
fn test_data_uri_is_accepted() {
    let request = GenerateRequest::new(format!("data:image/png;base64,{}", subject_png()));
    let report = generate(&ready_context(), &request);
    assert!(report.outcome.is_success());
}

#[test]
fn test_out_of_range_rejected_before_decode() {
    // The payload is not even base64; validation must fail first
    let request = GenerateRequest::new("%%%")
        .with_mc_resolution(1024)
        .with_texture_resolution(100);
    let report = generate(&ready_context(), &request);

    assert!(!report.visited(RequestState::Decoded));
    assert_eq!(report.final_state(), RequestState::Rejected);
    match report.outcome {
        Outcome::Rejected(Rejection::Validation(err)) => {
            let fields: Vec<_> = err.violations().iter().map(|v| v.field).collect();
            assert_eq!(fields, vec!["mcResolution", "textureResolution"]);
        }
        other => panic!("expected a validation rejection, got {other:?}"),
    }
}

#[test]
fn test_oversized_payload_rejected_before_container_decode() {
    let context = ServiceContext::new(config().with_max_image_bytes(64));
    context
        .install(LoadedModel::new(
            Arc::new(SilhouetteHullModel::default()),
            Device::Cpu,
            Arc::new(BorderSegmenter::default()),
        ))
        .unwrap();

    // 65 bytes that are not an image: a container decode would report InvalidImage
    let request = GenerateRequest::new(STANDARD.encode([0u8; 65]));
    let report = generate(&context, &request);

    assert!(matches!(
        report.outcome,
        Outcome::Rejected(Rejection::PayloadTooLarge { size: 65, limit: 64 })
    ));
    assert!(!report.visited(RequestState::Decoded));
}

#[test]
fn test_not_ready_does_no_work() {
    let model = Arc::new(CountingModel {
        inner: SilhouetteHullModel::default(),
        encodes: AtomicUsize::new(0),
    });
    let segmenter = Arc::new(CountingSegmenter::default());
    let context = ServiceContext::new(config());

    let request = GenerateRequest::new(subject_png()).with_background_removed(false);
    let report = generate(&context, &request);

    assert_eq!(
        report.trail,
        vec![RequestState::Received, RequestState::Validated, RequestState::Errored]
    );
    let response = response(&report.outcome);
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some(NOT_READY_MESSAGE));

    // Installing afterwards proves the counters work and were untouched before
    context
        .install(LoadedModel::new(model.clone(), Device::Cpu, segmenter.clone()))
        .unwrap();
    assert_eq!(model.encodes.load(Ordering::SeqCst), 0);
    assert_eq!(segmenter.calls.load(Ordering::SeqCst), 0);

    assert!(generate(&context, &request).outcome.is_success());
    assert_eq!(model.encodes.load(Ordering::SeqCst), 1);
    assert_eq!(segmenter.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transparent_pixel_composites_to_exact_gray() {
    let image = RgbaImage::from_fn(40, 40, |x, y| {
        if (10..30).contains(&x) && (10..30).contains(&y) {
            Rgba([250, 20, 90, 255])
        } else {
            Rgba([255, 255, 255, 0])
        }
    });
    let prepared = preprocess::prepare(
        &DynamicImage::ImageRgba8(image),
        false,
        0.5,
        &BorderSegmenter::default(),
    )
    .unwrap();

    // 20px subject padded to a 40px canvas: the corners came from alpha 0
    assert_eq!(prepared.dimensions(), (40, 40));
    assert_eq!(*prepared.get_pixel(0, 0), Rgb([GRAY_FILL_U8; 3]));
    assert_eq!(*prepared.get_pixel(39, 39), Rgb([GRAY_FILL_U8; 3]));
    assert_eq!(*prepared.get_pixel(20, 20), Rgb([250, 20, 90]));
}

#[test]
fn test_transparent_png_through_pipeline() {
    let image = RgbaImage::from_fn(40, 40, |x, y| {
        if (10..30).contains(&x) && (6..34).contains(&y) {
            Rgba([40, 200, 90, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let request = GenerateRequest::new(encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png))
        .with_background_removed(false)
        .with_return_preview(false);
    let report = generate(&ready_context(), &request);
    assert!(report.outcome.is_success());
}

#[test]
fn test_bake_texture_switches_color_source() {
    let context = ready_context();

    let colored = generate(&context, &GenerateRequest::new(subject_png()).with_bake_texture(false));
    let glb = STANDARD
        .decode(response(&colored.outcome).glb_base64.as_deref().unwrap())
        .unwrap();
    let summary = inspect_glb(&glb).unwrap();
    assert!(summary.has_attribute("COLOR_0"));
    assert!(!summary.has_attribute("TEXCOORD_0"));

    let baked = generate(
        &context,
        &GenerateRequest::new(subject_png())
            .with_bake_texture(true)
            .with_texture_resolution(512),
    );
    let glb = STANDARD
        .decode(response(&baked.outcome).glb_base64.as_deref().unwrap())
        .unwrap();
    let summary = inspect_glb(&glb).unwrap();
    assert!(!summary.has_attribute("COLOR_0"));
    assert!(summary.has_attribute("TEXCOORD_0"));
    assert!(summary.has_texture());
}

#[test]
fn test_identical_requests_produce_identical_glb_length() {
    let context = ready_context();
    let request = GenerateRequest::new(subject_png()).with_return_preview(false);

    let lengths: Vec<usize> = (0..3)
        .map(|_| {
            let report = generate(&context, &request);
            response(&report.outcome)
                .glb_base64
                .as_deref()
                .unwrap()
                .len()
        })
        .collect();

    assert_eq!(lengths[0], lengths[1], "GLB size must be deterministic");
    assert_eq!(lengths[1], lengths[2], "GLB size must be deterministic");
}

#[test]
fn test_higher_resolution_gives_denser_mesh() {
    let context = ready_context();
    let triangles = |resolution: i64| {
        let request = GenerateRequest::new(subject_png())
            .with_mc_resolution(resolution)
            .with_return_preview(false);
        let report = generate(&context, &request);
        let glb = STANDARD
            .decode(response(&report.outcome).glb_base64.as_deref().unwrap())
            .unwrap();
        inspect_glb(&glb).unwrap().triangle_count()
    };
    assert!(triangles(128) > triangles(64));
}

#[test]
fn test_no_foreground_is_a_structured_failure() {
    let image = RgbaImage::from_pixel(16, 16, Rgba([10, 10, 10, 0]));
    let request = GenerateRequest::new(encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png))
        .with_background_removed(false);
    let report = generate(&ready_context(), &request);

    assert_eq!(report.final_state(), RequestState::Errored);
    assert!(report.visited(RequestState::Decoded));
    assert_eq!(
        response(&report.outcome).error.as_deref(),
        Some("no foreground found")
    );
}

#[test]
fn test_hidden_error_details() {
    let context = ServiceContext::new(config().with_expose_error_details(false));
    context
        .install(LoadedModel::new(
            Arc::new(SilhouetteHullModel::default()),
            Device::Cpu,
            Arc::new(BorderSegmenter::default()),
        ))
        .unwrap();

    let image = RgbaImage::from_pixel(16, 16, Rgba([10, 10, 10, 0]));
    let request = GenerateRequest::new(encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png))
        .with_background_removed(false);
    let report = generate(&context, &request);
    assert_eq!(response(&report.outcome).error.as_deref(), Some("Inference failed"));
}

#[test]
fn test_glb_survives_file_roundtrip() {
    let report = generate(&ready_context(), &GenerateRequest::new(subject_png()));
    let glb = STANDARD
        .decode(response(&report.outcome).glb_base64.as_deref().unwrap())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.glb");
    std::fs::write(&path, &glb).unwrap();

    let summary = inspect_glb(&std::fs::read(&path).unwrap()).unwrap();
    assert!(summary.vertex_count() > 0);
    assert_eq!(summary.json["asset"]["version"], "2.0");
}
