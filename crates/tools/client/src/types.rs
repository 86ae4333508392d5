//! Types for photomesh client results and errors

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use photomesh::{GenerateResponse, NOT_READY_MESSAGE};
use thiserror::Error;

/// GLB payloads smaller than this cannot hold a usable mesh
pub const MIN_GLB_BYTES: usize = 100;

/// photomesh client error types
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request timeout after {0}s")]
    TimeoutError(u64),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Model not loaded on server")]
    ModelNotReady,

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("GLB file too small ({0} bytes), likely invalid")]
    InvalidGlb(usize),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Result type alias for client operations that may fail
pub type Result<T> = std::result::Result<T, ClientError>;

/// A decoded, successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedModel {
    /// Binary glTF bytes
    pub glb: Vec<u8>,

    /// PNG preview bytes, when requested
    pub preview_png: Option<Vec<u8>>,

    /// Server-side processing time
    pub processing_time_ms: Option<u64>,
}

impl GeneratedModel {
    /// Decode a generation response body.
    ///
    /// `success=false` bodies become [`ClientError::ModelNotReady`] or
    /// [`ClientError::GenerationFailed`]; tiny GLBs are refused.
    pub fn from_response(response: GenerateResponse) -> Result<Self> {
        if !response.success {
            let error = response.error.unwrap_or_else(|| "unknown error".to_string());
            if error == NOT_READY_MESSAGE {
                return Err(ClientError::ModelNotReady);
            }
            return Err(ClientError::GenerationFailed(error));
        }

        let glb_base64 = response
            .glb_base64
            .ok_or_else(|| ClientError::ParseError("successful response without glbBase64".into()))?;
        let glb = STANDARD.decode(glb_base64)?;
        if glb.len() < MIN_GLB_BYTES {
            return Err(ClientError::InvalidGlb(glb.len()));
        }

        let preview_png = response
            .preview_png_base64
            .map(|preview| STANDARD.decode(preview))
            .transpose()?;

        Ok(Self {
            glb,
            preview_png,
            processing_time_ms: response.processing_time_ms,
        })
    }

    /// Size of the GLB in bytes
    pub fn glb_len(&self) -> usize {
        self.glb.len()
    }

    pub fn has_preview(&self) -> bool {
        self.preview_png.is_some()
    }
}
