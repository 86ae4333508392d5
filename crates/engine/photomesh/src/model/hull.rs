//! Built-in silhouette inflation model
//!
//! Reconstructs a closed volume from a single view by inflating the subject's
//! silhouette: every foreground pixel gets a half-thickness that grows with
//! the square root of its distance to the silhouette boundary, giving rounded
//! profiles. Colour is projected straight through along the view axis.
//!
//! The scene code is a `code_size` x `code_size` plane with four channels:
//! half-thickness followed by linear RGB.

use super::{ModelError, ReconstructionModel, SceneCode};
use crate::device::Device;
use glam::Vec3;
use image::imageops::{self, FilterType};
use image::RgbImage;

const CHANNELS: usize = 4;
const THICKNESS: usize = 0;
const RED: usize = 1;

/// Half-thickness assigned to background texels; slightly negative so the
/// surface closes between the last foreground and first background texel
const BACKGROUND_THICKNESS: f32 = -0.05;

/// Chamfer weights for orthogonal and diagonal steps
const CHAMFER_ORTHO: u32 = 3;
const CHAMFER_DIAG: u32 = 4;

/// Tuning parameters for [`SilhouetteHullModel`]
#[derive(Debug, Clone, PartialEq)]
pub struct HullConfig {
    /// Edge length of the scene code plane
    pub code_size: u32,
    /// The image is mapped onto [-extent, extent] in x and y
    pub image_extent: f32,
    /// Maximum half-thickness along z
    pub depth_scale: f32,
    /// Per-channel colour distance from the background that counts as subject
    pub foreground_threshold: f32,
}

impl Default for HullConfig {
    fn default() -> Self {
        Self {
            code_size: 128,
            image_extent: 0.8,
            depth_scale: 0.45,
            foreground_threshold: 0.08,
        }
    }
}

/// Deterministic CPU reconstruction backend
#[derive(Debug, Clone)]
pub struct SilhouetteHullModel {
    id: String,
    config: HullConfig,
}

impl Default for SilhouetteHullModel {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MODEL_ID, HullConfig::default())
    }
}

impl SilhouetteHullModel {
    pub fn new(id: impl Into<String>, config: HullConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    pub fn config(&self) -> &HullConfig {
        &self.config
    }

    /// Map a world point onto scene code coordinates; `None` outside the plane
    fn project(&self, point: Vec3) -> Option<(f32, f32)> {
        let extent = self.config.image_extent;
        let u = (point.x + extent) / (2.0 * extent);
        let v = (extent - point.y) / (2.0 * extent);
        ((0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v)).then_some((u, v))
    }

    fn check_scene(&self, scene: &SceneCode) -> Result<(), ModelError> {
        if scene.channels() == CHANNELS {
            Ok(())
        } else {
            Err(ModelError::ChannelMismatch {
                expected: CHANNELS,
                actual: scene.channels(),
            })
        }
    }
}

impl ReconstructionModel for SilhouetteHullModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_device(&self, device: &Device) -> bool {
        matches!(device, Device::Cpu)
    }

    fn encode(&self, image: &RgbImage, device: &Device) -> Result<SceneCode, ModelError> {
        if !self.supports_device(device) {
            return Err(ModelError::UnsupportedDevice(*device));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(ModelError::EmptyImage);
        }

        let size = self.config.code_size.max(2);
        let resized = imageops::resize(image, size, size, FilterType::Triangle);
        let n = size as usize;

        let colors: Vec<Vec3> = resized
            .pixels()
            .map(|p| Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32) / 255.0)
            .collect();

        let background = border_mean(&colors, n);
        let threshold = self.config.foreground_threshold;
        let mut mask: Vec<bool> = colors
            .iter()
            .map(|c| (*c - background).abs().max_element() > threshold)
            .collect();
        if !mask.iter().any(|&m| m) {
            tracing::debug!("no subject separated from background, inflating whole frame");
            mask.iter_mut().for_each(|m| *m = true);
        }

        let distance = chamfer_distance(&mask, n);
        let max_distance = distance.iter().copied().max().unwrap_or(0).max(1) as f32;

        let mut code = SceneCode::new(n, n, CHANNELS);
        for y in 0..n {
            for x in 0..n {
                let i = y * n + x;
                let thickness = if mask[i] {
                    self.config.depth_scale * (distance[i] as f32 / max_distance).sqrt()
                } else {
                    BACKGROUND_THICKNESS
                };
                code.set(x, y, THICKNESS, thickness);
                for c in 0..3 {
                    code.set(x, y, RED + c, colors[i][c]);
                }
            }
        }

        Ok(code)
    }

    fn query_density(&self, scene: &SceneCode, points: &[Vec3]) -> Result<Vec<f32>, ModelError> {
        self.check_scene(scene)?;
        Ok(points
            .iter()
            .map(|p| {
                let thickness = match self.project(*p) {
                    Some((u, v)) => scene.sample(u, v, THICKNESS),
                    None => BACKGROUND_THICKNESS,
                };
                thickness - p.z.abs()
            })
            .collect())
    }

    fn query_color(&self, scene: &SceneCode, points: &[Vec3]) -> Result<Vec<Vec3>, ModelError> {
        self.check_scene(scene)?;
        let extent = self.config.image_extent;
        Ok(points
            .iter()
            .map(|p| {
                let u = (p.x + extent) / (2.0 * extent);
                let v = (extent - p.y) / (2.0 * extent);
                Vec3::new(
                    scene.sample(u, v, RED),
                    scene.sample(u, v, RED + 1),
                    scene.sample(u, v, RED + 2),
                )
            })
            .collect())
    }
}

/// Mean colour of the outermost ring of pixels
fn border_mean(colors: &[Vec3], n: usize) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0usize;
    for y in 0..n {
        for x in 0..n {
            if x == 0 || y == 0 || x == n - 1 || y == n - 1 {
                sum += colors[y * n + x];
                count += 1;
            }
        }
    }
    sum / count.max(1) as f32
}

/// Two-pass chamfer distance from each foreground pixel to the nearest
/// background pixel, in units of one third of a pixel. Everything outside the
/// plane counts as background.
fn chamfer_distance(mask: &[bool], n: usize) -> Vec<u32> {
    let mut dist: Vec<u32> = mask.iter().map(|&m| if m { u32::MAX } else { 0 }).collect();

    let at = |dist: &[u32], x: isize, y: isize| -> u32 {
        if x < 0 || y < 0 || x >= n as isize || y >= n as isize {
            0
        } else {
            dist[y as usize * n + x as usize]
        }
    };

    for y in 0..n as isize {
        for x in 0..n as isize {
            let i = y as usize * n + x as usize;
            if dist[i] == 0 {
                continue;
            }
            let best = [
                at(&dist, x - 1, y).saturating_add(CHAMFER_ORTHO),
                at(&dist, x - 1, y - 1).saturating_add(CHAMFER_DIAG),
                at(&dist, x, y - 1).saturating_add(CHAMFER_ORTHO),
                at(&dist, x + 1, y - 1).saturating_add(CHAMFER_DIAG),
            ]
            .into_iter()
            .min()
            .unwrap_or(u32::MAX);
            dist[i] = dist[i].min(best);
        }
    }

    for y in (0..n as isize).rev() {
        for x in (0..n as isize).rev() {
            let i = y as usize * n + x as usize;
            if dist[i] == 0 {
                continue;
            }
            let best = [
                at(&dist, x + 1, y).saturating_add(CHAMFER_ORTHO),
                at(&dist, x + 1, y + 1).saturating_add(CHAMFER_DIAG),
                at(&dist, x, y + 1).saturating_add(CHAMFER_ORTHO),
                at(&dist, x - 1, y + 1).saturating_add(CHAMFER_DIAG),
            ]
            .into_iter()
            .min()
            .unwrap_or(u32::MAX);
            dist[i] = dist[i].min(best);
        }
    }

    dist
}
