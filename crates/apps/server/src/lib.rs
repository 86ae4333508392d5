//! photomesh server crate.
//!
//! Wraps the [`photomesh`] request pipeline in an axum HTTP service: env-driven
//! configuration, background model loading, a single-worker inference queue
//! that serializes access to the shared model, and request metrics.

pub mod config;
pub mod metrics;
pub mod queue;
pub mod routes;
pub mod startup;

pub use config::ServerConfig;
pub use metrics::{start_metrics_reporter, ServiceMetrics};
pub use queue::{InferenceQueue, QueueError};
pub use routes::{create_router, ApiError, AppState, ErrorDetail};
pub use startup::{load_model, spawn_model_loader};
