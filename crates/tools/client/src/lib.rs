//! photomesh server client library
//!
//! Talks to a running photomesh server over HTTP.
//!
//! # Features
//!
//! - **Health Checks**: readiness, resolved device and model id
//! - **Image-to-Mesh Generation**: returns the decoded GLB and optional preview
//! - **Retry Logic**: exponential backoff for connection errors, 5xx and not-ready answers
//! - **Payload Checks**: GLBs under [`MIN_GLB_BYTES`] are treated as invalid
//!
//! # Example
//!
//! ```no_run
//! use photomesh_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PhotomeshClient::new("http://localhost:8000");
//!     let model = client
//!         .generate(&GenerateRequest::new("...").with_bake_texture(true))
//!         .await?;
//!     std::fs::write("model.glb", &model.glb)?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod types;

pub use client::PhotomeshClient;
pub use photomesh::{GenerateRequest, HealthStatus};
pub use types::{ClientError, GeneratedModel, MIN_GLB_BYTES};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::PhotomeshClient;
    pub use crate::types::{ClientError, GeneratedModel};
    pub use photomesh::{GenerateRequest, HealthStatus};
}
