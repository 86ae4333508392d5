//! Pipeline configuration constants
//!
//! These values are owned by whoever hosts the pipeline (the server reads them
//! from the environment); the pipeline only consumes them.

use crate::types::MC_RESOLUTION_RANGE;

/// Default model identifier resolved by [`crate::model::registry`]
pub const DEFAULT_MODEL_ID: &str = "photomesh/silhouette-hull";

/// Default device preference; falls back to CPU when unsupported
pub const DEFAULT_DEVICE: &str = "cuda:0";

/// Default number of field queries per model call
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default limit on decoded image bytes (8 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Default isosurface resolution when a request omits `mcResolution`
pub const DEFAULT_MC_RESOLUTION: u32 = 256;

/// Default edge length of the rendered preview in pixels
pub const DEFAULT_PREVIEW_SIZE: u32 = 256;

/// Configuration consumed by [`crate::pipeline::generate`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Identifier of the reconstruction model to load
    pub model_id: String,
    /// Field queries are issued in batches of at most this many points
    pub chunk_size: usize,
    /// Decoded payloads above this size are rejected before image decoding
    pub max_image_bytes: usize,
    /// Resolution used when the request does not name one
    pub default_mc_resolution: u32,
    /// Preview render size (square)
    pub preview_size: u32,
    /// Forward inference error text to clients verbatim
    pub expose_error_details: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            default_mc_resolution: DEFAULT_MC_RESOLUTION,
            preview_size: DEFAULT_PREVIEW_SIZE,
            expose_error_details: true,
        }
    }
}

impl PipelineConfig {
    /// Set the chunk size for field queries
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the decoded image size limit
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// Set the fallback isosurface resolution
    pub fn with_default_mc_resolution(mut self, resolution: u32) -> Self {
        self.default_mc_resolution = resolution;
        self
    }

    /// Set the preview size
    pub fn with_preview_size(mut self, size: u32) -> Self {
        self.preview_size = size.max(1);
        self
    }

    /// Forward (or hide) inference error details in responses
    pub fn with_expose_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk size must be >= 1".to_string());
        }
        if self.max_image_bytes == 0 {
            return Err("max image bytes must be >= 1".to_string());
        }
        if !MC_RESOLUTION_RANGE.contains(&self.default_mc_resolution) {
            return Err(format!(
                "default mc resolution must be within {}..={} (got {})",
                MC_RESOLUTION_RANGE.start(),
                MC_RESOLUTION_RANGE.end(),
                self.default_mc_resolution
            ));
        }
        if self.preview_size == 0 {
            return Err("preview size must be >= 1".to_string());
        }
        Ok(())
    }
}
