//! Types for photomesh API requests and responses

use crate::error::{FieldViolation, ValidationError};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Accepted isosurface resolutions (samples per axis)
pub const MC_RESOLUTION_RANGE: RangeInclusive<u32> = 64..=512;

/// Accepted foreground ratios
pub const FOREGROUND_RATIO_RANGE: RangeInclusive<f64> = 0.5..=0.95;

/// Accepted baked texture resolutions
pub const TEXTURE_RESOLUTION_RANGE: RangeInclusive<u32> = 512..=4096;

/// Request body for `POST /api/generate`
///
/// Integer fields are kept as `i64` on the wire so that negative or oversized
/// values reach [`GenerateRequest::validate`] and get reported as range
/// violations instead of opaque parse errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Base64-encoded image, optionally wrapped in a data URI
    pub image: String,

    /// Isosurface resolution (64-512); the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc_resolution: Option<i64>,

    /// Caller asserts the subject is already isolated (default: true)
    #[serde(default = "default_background_removed")]
    pub background_removed: bool,

    /// Fraction of the canvas the recentered subject occupies (0.5-0.95)
    #[serde(default = "default_foreground_ratio")]
    pub foreground_ratio: f64,

    /// Bake a texture instead of colouring vertices (default: false)
    #[serde(default)]
    pub bake_texture: bool,

    /// Edge length of the baked texture (512-4096)
    #[serde(default = "default_texture_resolution")]
    pub texture_resolution: i64,

    /// Render a PNG preview of the reconstruction (default: true)
    #[serde(default = "default_return_preview")]
    pub return_preview: bool,
}

fn default_background_removed() -> bool {
    true
}

fn default_foreground_ratio() -> f64 {
    0.85
}

fn default_texture_resolution() -> i64 {
    2048
}

fn default_return_preview() -> bool {
    true
}

impl GenerateRequest {
    /// Create a request for the given image with default parameters
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            mc_resolution: None,
            background_removed: default_background_removed(),
            foreground_ratio: default_foreground_ratio(),
            bake_texture: false,
            texture_resolution: default_texture_resolution(),
            return_preview: default_return_preview(),
        }
    }

    /// Set the isosurface resolution
    pub fn with_mc_resolution(mut self, resolution: i64) -> Self {
        self.mc_resolution = Some(resolution);
        self
    }

    /// Declare whether the background has already been removed
    pub fn with_background_removed(mut self, removed: bool) -> Self {
        self.background_removed = removed;
        self
    }

    /// Set the foreground ratio
    pub fn with_foreground_ratio(mut self, ratio: f64) -> Self {
        self.foreground_ratio = ratio;
        self
    }

    /// Request texture baking
    pub fn with_bake_texture(mut self, bake: bool) -> Self {
        self.bake_texture = bake;
        self
    }

    /// Set the baked texture resolution
    pub fn with_texture_resolution(mut self, resolution: i64) -> Self {
        self.texture_resolution = resolution;
        self
    }

    /// Request (or skip) the preview render
    pub fn with_return_preview(mut self, preview: bool) -> Self {
        self.return_preview = preview;
        self
    }

    /// Check every numeric field against its declared range.
    ///
    /// All violations are collected so the caller sees every bad field at
    /// once. Nothing about the image payload is inspected here.
    pub fn validate(&self, default_mc_resolution: u32) -> Result<RequestParams, ValidationError> {
        let mut violations = Vec::new();

        let mc_resolution = match self.mc_resolution {
            None => Some(default_mc_resolution),
            Some(value) => check_int("mcResolution", value, &MC_RESOLUTION_RANGE, &mut violations),
        };
        let texture_resolution = check_int(
            "textureResolution",
            self.texture_resolution,
            &TEXTURE_RESOLUTION_RANGE,
            &mut violations,
        );

        if !self.foreground_ratio.is_finite()
            || !FOREGROUND_RATIO_RANGE.contains(&self.foreground_ratio)
        {
            violations.push(FieldViolation::new(
                "foregroundRatio",
                format!(
                    "must be between {} and {} (got {})",
                    FOREGROUND_RATIO_RANGE.start(),
                    FOREGROUND_RATIO_RANGE.end(),
                    self.foreground_ratio
                ),
            ));
        }

        match (mc_resolution, texture_resolution) {
            (Some(mc_resolution), Some(texture_resolution)) if violations.is_empty() => {
                Ok(RequestParams {
                    mc_resolution,
                    background_removed: self.background_removed,
                    foreground_ratio: self.foreground_ratio,
                    bake_texture: self.bake_texture,
                    texture_resolution,
                    return_preview: self.return_preview,
                })
            }
            _ => Err(ValidationError::new(violations)),
        }
    }
}

fn check_int(
    field: &'static str,
    value: i64,
    range: &RangeInclusive<u32>,
    violations: &mut Vec<FieldViolation>,
) -> Option<u32> {
    match u32::try_from(value) {
        Ok(v) if range.contains(&v) => Some(v),
        _ => {
            violations.push(FieldViolation::new(
                field,
                format!(
                    "must be between {} and {} (got {})",
                    range.start(),
                    range.end(),
                    value
                ),
            ));
            None
        }
    }
}

/// Range-checked request parameters (everything except the image payload)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestParams {
    pub mc_resolution: u32,
    pub background_removed: bool,
    pub foreground_ratio: f64,
    pub bake_texture: bool,
    pub texture_resolution: u32,
    pub return_preview: bool,
}

/// Response body for `POST /api/generate`
///
/// Absent fields serialize as `null`, matching what existing clients parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,

    /// Base64-encoded binary glTF
    #[serde(default)]
    pub glb_base64: Option<String>,

    /// Base64-encoded PNG preview
    #[serde(default)]
    pub preview_png_base64: Option<String>,

    /// Wall-clock processing time in milliseconds
    #[serde(default)]
    pub processing_time_ms: Option<u64>,

    /// Failure description when `success` is false
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerateResponse {
    /// Successful generation
    pub fn succeeded(
        glb_base64: String,
        preview_png_base64: Option<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            success: true,
            glb_base64: Some(glb_base64),
            preview_png_base64,
            processing_time_ms: Some(processing_time_ms),
            error: None,
        }
    }

    /// Failed generation with a message for the caller
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            glb_base64: None,
            preview_png_base64: None,
            processing_time_ms: None,
            error: Some(error.into()),
        }
    }

    /// Check that the field presence rules hold
    pub fn is_well_formed(&self) -> bool {
        if self.success {
            self.glb_base64.is_some() && self.error.is_none()
        } else {
            self.error.is_some() && self.glb_base64.is_none() && self.preview_png_base64.is_none()
        }
    }
}

/// Health check response from `GET /api/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub success: bool,

    /// Whether the model is loaded and requests will be served
    pub ready: bool,

    /// Resolved compute device (e.g. `cpu`, `cuda:0`)
    pub device: String,

    /// Whether the resolved device is a CUDA device
    ///
    /// Derived from `device` alone; the host is not queried for GPUs, so a
    /// CPU fallback reports `false` even on a machine with CUDA available.
    pub cuda: bool,

    /// Identifier of the configured model
    pub model_id: String,
}

impl HealthStatus {
    /// Check if the server is ready to handle generation requests
    pub fn is_ready(&self) -> bool {
        self.success && self.ready
    }
}
