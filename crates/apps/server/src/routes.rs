//! HTTP routes.
//!
//! | Route | Body |
//! |---|---|
//! | `POST /api/generate` | `GenerateRequest` → `GenerateResponse`, or `{"detail"}` with 413/422 |
//! | `GET /api/health` | `HealthStatus` |
//! | `GET /metrics` | Prometheus text |

use crate::metrics::{queue_gauge, ServiceMetrics};
use crate::queue::InferenceQueue;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use photomesh::decode::decoded_len;
use photomesh::{
    generate, GenerateRequest, GenerateResponse, HealthStatus, Outcome, Rejection, ServiceContext,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ServiceContext>,
    pub queue: InferenceQueue,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// State with a fresh queue worker; must be called inside a tokio runtime
    pub fn new(context: Arc<ServiceContext>, queue_capacity: usize) -> Self {
        let queue = InferenceQueue::spawn(context.clone(), queue_capacity);
        Self {
            context,
            queue,
            metrics: Arc::new(ServiceMetrics::default()),
        }
    }
}

/// Transport-level error body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub detail: String,
}

/// A request refused before the pipeline produced a response body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorDetail { detail: self.detail })).into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        let status = match rejection {
            Rejection::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Rejection::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        };
        Self::new(status, rejection.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Oversized bodies keep their 413; every other parse problem is a 422
        let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        Self::new(status, rejection.body_text())
    }
}

/// Create the API router
pub fn create_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/api/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.context.health())
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    let mut text = state.metrics.to_prometheus();
    text.push_str(&queue_gauge(state.queue.pending()));
    text
}

async fn generate_handler(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        state.metrics.record_malformed();
        ApiError::from(rejection)
    })?;

    // Not ready, out-of-range fields and oversized payloads never reach the
    // model, so they skip the queue
    let config = state.context.config();
    let rejected_early = request.validate(config.default_mc_resolution).is_err()
        || decoded_len(&request.image).is_ok_and(|len| len > config.max_image_bytes);
    let report = if state.context.is_ready() && !rejected_early {
        match state.queue.submit(request).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Inference queue failure: {e}");
                state.metrics.record_queue_failure();
                return Ok(Json(GenerateResponse::failed(e.to_string())));
            }
        }
    } else {
        generate(&state.context, &request)
    };

    state.metrics.record(&report);
    match report.outcome {
        Outcome::Responded(response) => Ok(Json(response)),
        Outcome::Rejected(rejection) => Err(rejection.into()),
    }
}
