//! Single-image 3D reconstruction pipeline
//!
//! This crate turns one photograph into a textured triangle mesh. It owns the
//! request pipeline that sits behind the photomesh HTTP service:
//!
//! - **Validation & decoding**: field-range checks, data-URI stripping, base64
//!   decoding and the decoded-size limit ([`decode`])
//! - **Foreground normalization**: segmentation, recentering and mid-gray
//!   compositing ([`preprocess`])
//! - **Model invocation**: scene encoding, isosurface extraction, texture
//!   baking and preview rendering ([`invoke`], [`model`], [`mesh`], [`render`])
//! - **Response assembly**: GLB/PNG encoding and failure mapping ([`pipeline`])
//!
//! Model loading is not done here. A startup task builds a [`LoadedModel`] and
//! installs it into the [`ServiceContext`]; until then every request answers
//! with the not-ready failure.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use photomesh::{
//!     model::registry, BorderSegmenter, Device, GenerateRequest, LoadedModel, Outcome,
//!     PipelineConfig, ServiceContext,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = ServiceContext::new(PipelineConfig::default());
//!     let model = registry::load(&context.config().model_id)?;
//!     context.install(LoadedModel::new(
//!         model,
//!         Device::Cpu,
//!         Arc::new(BorderSegmenter::default()),
//!     ))?;
//!
//!     let request = GenerateRequest::new("data:image/png;base64,...");
//!     match photomesh::generate(&context, &request).outcome {
//!         Outcome::Responded(response) => println!("success: {}", response.success),
//!         Outcome::Rejected(rejection) => eprintln!("rejected: {}", rejection),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod decode;
pub mod device;
pub mod error;
pub mod invoke;
pub mod mesh;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod types;

pub use config::PipelineConfig;
pub use context::{LoadedModel, ServiceContext};
pub use device::Device;
pub use error::{PipelineError, Rejection, ValidationError, NOT_READY_MESSAGE};
pub use mesh::Mesh;
pub use model::{ReconstructionModel, SceneCode, SilhouetteHullModel};
pub use pipeline::{generate, Outcome, Report, RequestState};
pub use preprocess::{BorderSegmenter, Segmenter};
pub use types::{GenerateRequest, GenerateResponse, HealthStatus, RequestParams};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::context::{LoadedModel, ServiceContext};
    pub use crate::device::Device;
    pub use crate::error::{PipelineError, Rejection};
    pub use crate::pipeline::{generate, Outcome};
    pub use crate::types::{GenerateRequest, GenerateResponse, HealthStatus};
}
