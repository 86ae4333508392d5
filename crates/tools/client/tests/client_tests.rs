//! Client tests against in-process servers bound to an ephemeral port

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use photomesh::{
    BorderSegmenter, Device, GenerateResponse, LoadedModel, PipelineConfig, ServiceContext,
    SilhouetteHullModel,
};
use photomesh_client::{ClientError, GenerateRequest, PhotomeshClient};
use photomesh_server::{create_router, AppState};
use serde_json::json;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn fast_client(url: &str) -> PhotomeshClient {
    PhotomeshClient::new(url).with_base_delay_ms(1).with_max_retries(2)
}

fn fake_glb(len: usize) -> String {
    let mut bytes = b"glTF".to_vec();
    bytes.resize(len, 0);
    STANDARD.encode(bytes)
}

/// Fails with 500 `failures` times, then succeeds
async fn flaky_server(failures: usize) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/api/generate",
            post(move |State(calls): State<Arc<AtomicUsize>>| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
                } else {
                    Json(GenerateResponse::succeeded(fake_glb(512), None, 5)).into_response()
                }
            }),
        )
        .with_state(calls.clone());
    (serve(router).await, calls)
}

#[tokio::test]
async fn test_retries_server_errors() {
    let (url, calls) = flaky_server(2).await;
    let model = fast_client(&url)
        .generate(&GenerateRequest::new("AAAA"))
        .await
        .unwrap();
    assert_eq!(model.glb_len(), 512);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let (url, calls) = flaky_server(10).await;
    let result = fast_client(&url).generate(&GenerateRequest::new("AAAA")).await;
    assert!(matches!(result, Err(ClientError::ServerError(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rejection_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/api/generate",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "detail": "Invalid request: mcResolution: out of range" })),
                )
            }),
        )
        .with_state(calls.clone());
    let url = serve(router).await;

    match fast_client(&url).generate(&GenerateRequest::new("AAAA")).await {
        Err(ClientError::Rejected { status, detail }) => {
            assert_eq!(status, 422);
            assert!(detail.contains("mcResolution"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tiny_glb_is_invalid() {
    let router = Router::new().route(
        "/api/generate",
        post(|| async { Json(GenerateResponse::succeeded(fake_glb(40), None, 1)) }),
    );
    let url = serve(router).await;
    let result = fast_client(&url).generate(&GenerateRequest::new("AAAA")).await;
    assert!(matches!(result, Err(ClientError::InvalidGlb(40))));
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = fast_client(&format!("http://{addr}"))
        .generate(&GenerateRequest::new("AAAA"))
        .await;
    match result {
        Err(ClientError::ConnectionError(message)) => assert!(message.contains("3 attempts")),
        other => panic!("unexpected: {other:?}"),
    }
}

fn real_router(ready: bool) -> Router {
    let config = PipelineConfig::default()
        .with_default_mc_resolution(64)
        .with_preview_size(32);
    let context = Arc::new(ServiceContext::new(config));
    if ready {
        context
            .install(LoadedModel::new(
                Arc::new(SilhouetteHullModel::default()),
                Device::Cpu,
                Arc::new(BorderSegmenter::default()),
            ))
            .unwrap();
    }
    create_router(AppState::new(context, 2), 1024 * 1024)
}

fn subject_png() -> String {
    let image = RgbImage::from_fn(40, 40, |x, y| {
        if (10..30).contains(&x) && (6..34).contains(&y) {
            Rgb([200, 40, 40])
        } else {
            Rgb([127, 127, 127])
        }
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_end_to_end_against_server() {
    let url = serve(real_router(true)).await;
    let client = fast_client(&url);

    let health = client.health_check().await.unwrap();
    assert!(health.is_ready());
    assert_eq!(health.device, "cpu");

    let model = client
        .generate(&GenerateRequest::new(subject_png()).with_return_preview(true))
        .await
        .unwrap();
    assert_eq!(&model.glb[..4], b"glTF");
    assert!(model.has_preview());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.glb");
    std::fs::write(&path, &model.glb).unwrap();
    let summary = photomesh::mesh::inspect_glb(&std::fs::read(&path).unwrap()).unwrap();
    assert!(summary.vertex_count() > 0);
}

#[tokio::test]
async fn test_not_ready_retried_then_reported() {
    let url = serve(real_router(false)).await;
    let client = fast_client(&url);

    assert!(!client.health_check().await.unwrap().is_ready());
    let result = client.generate(&GenerateRequest::new(subject_png())).await;
    assert!(matches!(result, Err(ClientError::ModelNotReady)));
}

#[tokio::test]
async fn test_validation_rejection_from_server() {
    let url = serve(real_router(true)).await;
    let request = GenerateRequest::new(subject_png()).with_texture_resolution(100);
    match fast_client(&url).generate(&request).await {
        Err(ClientError::Rejected { status, detail }) => {
            assert_eq!(status, 422);
            assert!(detail.contains("textureResolution"), "{detail}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}
