//! Reconstruction model abstraction
//!
//! A model encodes one normalized image into a [`SceneCode`] and then answers
//! density and colour queries against it. Mesh extraction, texture baking and
//! preview rendering are built on top of those two queries, so every backend
//! gets them for free.

pub mod hull;
pub mod registry;

pub use hull::{HullConfig, SilhouetteHullModel};

use crate::device::Device;
use glam::Vec3;
use image::RgbImage;
use thiserror::Error;

/// Model-side failures
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Model does not support device {0}")]
    UnsupportedDevice(Device),

    #[error("Cannot encode an empty image")]
    EmptyImage,

    #[error("Scene code has {actual} channels, model expects {expected}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Reconstruction produced an empty surface at resolution {0}")]
    EmptySurface(u32),

    #[error("Model query failed: {0}")]
    Query(String),
}

/// Latent encoding of one input image
///
/// Stored as a single feature plane (`height` x `width` x `channels`,
/// row-major); what each channel means is up to the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneCode {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl SceneCode {
    /// Zero-filled feature plane
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width * height * channels],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn get(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + channel]
    }

    pub fn set(&mut self, x: usize, y: usize, channel: usize, value: f32) {
        self.data[(y * self.width + x) * self.channels + channel] = value;
    }

    /// Bilinear sample at normalized coordinates (`u`, `v` in 0..=1, clamped)
    pub fn sample(&self, u: f32, v: f32, channel: usize) -> f32 {
        let fx = (u.clamp(0.0, 1.0) * self.width as f32 - 0.5).max(0.0);
        let fy = (v.clamp(0.0, 1.0) * self.height as f32 - 0.5).max(0.0);

        let x0 = (fx.floor() as usize).min(self.width - 1);
        let y0 = (fy.floor() as usize).min(self.height - 1);
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = self.get(x0, y0, channel) * (1.0 - tx) + self.get(x1, y0, channel) * tx;
        let bottom = self.get(x0, y1, channel) * (1.0 - tx) + self.get(x1, y1, channel) * tx;
        top * (1.0 - ty) + bottom * ty
    }
}

/// A single-image 3D reconstruction backend
///
/// Implementations must be usable from several threads; the service decides
/// whether calls are serialized.
pub trait ReconstructionModel: Send + Sync {
    /// Identifier the model was loaded under
    fn id(&self) -> &str;

    /// Whether the model can run on the given device
    fn supports_device(&self, device: &Device) -> bool;

    /// Encode a normalized RGB image into a scene code
    fn encode(&self, image: &RgbImage, device: &Device) -> Result<SceneCode, ModelError>;

    /// Density at each point; values above [`Self::iso_level`] are inside
    fn query_density(&self, scene: &SceneCode, points: &[Vec3]) -> Result<Vec<f32>, ModelError>;

    /// Linear RGB colour (0..=1) at each point
    fn query_color(&self, scene: &SceneCode, points: &[Vec3]) -> Result<Vec<Vec3>, ModelError>;

    /// Density threshold separating inside from outside
    fn iso_level(&self) -> f32 {
        0.0
    }

    /// Half extent of the cube that bounds every reconstruction
    fn bounding_radius(&self) -> f32 {
        0.87
    }
}

/// Issues field queries in fixed-size chunks
pub struct FieldSampler<'a> {
    model: &'a dyn ReconstructionModel,
    scene: &'a SceneCode,
    chunk_size: usize,
}

impl<'a> FieldSampler<'a> {
    pub fn new(model: &'a dyn ReconstructionModel, scene: &'a SceneCode, chunk_size: usize) -> Self {
        Self {
            model,
            scene,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn model(&self) -> &dyn ReconstructionModel {
        self.model
    }

    pub fn iso_level(&self) -> f32 {
        self.model.iso_level()
    }

    pub fn bounding_radius(&self) -> f32 {
        self.model.bounding_radius()
    }

    pub fn density(&self, points: &[Vec3]) -> Result<Vec<f32>, ModelError> {
        let mut out = Vec::with_capacity(points.len());
        for chunk in points.chunks(self.chunk_size) {
            let values = self.model.query_density(self.scene, chunk)?;
            check_len(chunk.len(), values.len())?;
            out.extend(values);
        }
        Ok(out)
    }

    pub fn color(&self, points: &[Vec3]) -> Result<Vec<Vec3>, ModelError> {
        let mut out = Vec::with_capacity(points.len());
        for chunk in points.chunks(self.chunk_size) {
            let values = self.model.query_color(self.scene, chunk)?;
            check_len(chunk.len(), values.len())?;
            out.extend(values);
        }
        Ok(out)
    }
}

fn check_len(expected: usize, actual: usize) -> Result<(), ModelError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ModelError::Query(format!(
            "expected {expected} values, model returned {actual}"
        )))
    }
}
