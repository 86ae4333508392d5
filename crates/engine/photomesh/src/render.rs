//! Preview rendering by ray marching the density field
//!
//! Rays from a pinhole camera are clipped to the model's bounding cube and
//! marched in lockstep, so each step is one batched density query over every
//! ray still in flight. Hits are refined by bisection and shaded with a
//! Lambert term against the field's gradient.

use crate::model::{FieldSampler, ModelError};
use crate::mesh::texture::to_rgb8;
use glam::Vec3;
use image::{Rgb, RgbImage};

/// Background fill for pixels whose ray never hits the surface
pub const PREVIEW_BACKGROUND: Rgb<u8> = Rgb([127, 127, 127]);

const AMBIENT: f32 = 0.3;
const DIFFUSE: f32 = 0.7;

/// Orbit camera and marching parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRenderer {
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
    pub distance: f32,
    pub fov_deg: f32,
    pub steps: u32,
    pub refine_iterations: u32,
}

impl Default for PreviewRenderer {
    fn default() -> Self {
        Self {
            azimuth_deg: 0.0,
            elevation_deg: 0.0,
            distance: 1.9,
            fov_deg: 40.0,
            steps: 128,
            refine_iterations: 6,
        }
    }
}

struct Ray {
    pixel: usize,
    origin: Vec3,
    dir: Vec3,
    t: f32,
    t_far: f32,
    dt: f32,
}

impl Ray {
    fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

impl PreviewRenderer {
    pub fn with_azimuth(mut self, degrees: f32) -> Self {
        self.azimuth_deg = degrees;
        self
    }

    pub fn with_elevation(mut self, degrees: f32) -> Self {
        self.elevation_deg = degrees;
        self
    }

    /// Camera position on the orbit, looking at the origin
    pub fn camera_position(&self) -> Vec3 {
        let az = self.azimuth_deg.to_radians();
        let el = self.elevation_deg.to_radians();
        Vec3::new(
            self.distance * el.cos() * az.sin(),
            self.distance * el.sin(),
            self.distance * el.cos() * az.cos(),
        )
    }

    /// Render a `size` x `size` shaded view of the sampler's surface
    pub fn render(&self, sampler: &FieldSampler<'_>, size: u32) -> Result<RgbImage, ModelError> {
        let size = size.max(1);
        let eye = self.camera_position();
        let forward = (-eye).normalize();
        let right = forward.cross(Vec3::Y).try_normalize().unwrap_or(Vec3::X);
        let up = right.cross(forward);
        let half = (self.fov_deg.to_radians() * 0.5).tan();
        let light = (-forward + up * 0.5 + right * 0.3).normalize();

        let radius = sampler.bounding_radius();
        let iso = sampler.iso_level();
        let steps = self.steps.max(1) as f32;

        let mut image = RgbImage::from_pixel(size, size, PREVIEW_BACKGROUND);

        let mut active: Vec<Ray> = Vec::new();
        for y in 0..size {
            for x in 0..size {
                let nx = (2.0 * (x as f32 + 0.5) / size as f32 - 1.0) * half;
                let ny = (1.0 - 2.0 * (y as f32 + 0.5) / size as f32) * half;
                let dir = (forward + right * nx + up * ny).normalize();
                if let Some((t_near, t_far)) = intersect_cube(eye, dir, radius) {
                    active.push(Ray {
                        pixel: (y * size + x) as usize,
                        origin: eye,
                        dir,
                        t: t_near,
                        t_far,
                        dt: (t_far - t_near) / steps,
                    });
                }
            }
        }

        // (ray, outside t, inside t)
        let mut hits: Vec<(Ray, f32, f32)> = Vec::new();
        let mut previous: Vec<f32> = active.iter().map(|r| r.t).collect();
        while !active.is_empty() {
            let points: Vec<Vec3> = active.iter().map(|r| r.at(r.t)).collect();
            let density = sampler.density(&points)?;

            let mut still_active = Vec::with_capacity(active.len());
            let mut still_previous = Vec::with_capacity(active.len());
            for ((mut ray, d), prev) in active.into_iter().zip(density).zip(previous) {
                if d > iso {
                    let t = ray.t;
                    hits.push((ray, prev, t));
                } else if ray.t < ray.t_far {
                    let prev = ray.t;
                    ray.t = (ray.t + ray.dt).min(ray.t_far);
                    still_active.push(ray);
                    still_previous.push(prev);
                }
            }
            active = still_active;
            previous = still_previous;
        }

        for _ in 0..self.refine_iterations {
            if hits.is_empty() {
                break;
            }
            let points: Vec<Vec3> = hits
                .iter()
                .map(|(ray, outside, inside)| ray.at(0.5 * (outside + inside)))
                .collect();
            let density = sampler.density(&points)?;
            for ((_, outside, inside), d) in hits.iter_mut().zip(density) {
                let mid = 0.5 * (*outside + *inside);
                if d > iso {
                    *inside = mid;
                } else {
                    *outside = mid;
                }
            }
        }

        let surface: Vec<Vec3> = hits.iter().map(|(ray, _, inside)| ray.at(*inside)).collect();
        let normals = self.normals(sampler, &surface, radius)?;
        let colors = sampler.color(&surface)?;

        for (((ray, _, _), normal), color) in hits.iter().zip(normals).zip(colors) {
            let shade = AMBIENT + DIFFUSE * normal.dot(light).max(0.0);
            let x = (ray.pixel % size as usize) as u32;
            let y = (ray.pixel / size as usize) as u32;
            image.put_pixel(x, y, to_rgb8(color * shade));
        }

        tracing::debug!(size, hits = hits.len(), "rendered preview");
        Ok(image)
    }

    /// Outward normals from central differences of the density
    fn normals(
        &self,
        sampler: &FieldSampler<'_>,
        points: &[Vec3],
        radius: f32,
    ) -> Result<Vec<Vec3>, ModelError> {
        let h = radius * 2.0 / self.steps.max(1) as f32 * 0.5;
        let offsets = [
            Vec3::X * h,
            -Vec3::X * h,
            Vec3::Y * h,
            -Vec3::Y * h,
            Vec3::Z * h,
            -Vec3::Z * h,
        ];
        let neighbours: Vec<Vec3> = points
            .iter()
            .flat_map(|p| offsets.iter().map(move |o| *p + *o))
            .collect();
        let density = sampler.density(&neighbours)?;
        Ok(density
            .chunks_exact(6)
            .map(|d| {
                let gradient = Vec3::new(d[0] - d[1], d[2] - d[3], d[4] - d[5]);
                (-gradient).try_normalize().unwrap_or(Vec3::Z)
            })
            .collect())
    }
}

/// Render the front view with default camera settings
pub fn render_preview(sampler: &FieldSampler<'_>, size: u32) -> Result<RgbImage, ModelError> {
    PreviewRenderer::default().render(sampler, size)
}

/// Slab test against the cube [-radius, radius]^3
fn intersect_cube(origin: Vec3, dir: Vec3, radius: f32) -> Option<(f32, f32)> {
    let inv = dir.recip();
    let t0 = (Vec3::splat(-radius) - origin) * inv;
    let t1 = (Vec3::splat(radius) - origin) * inv;
    let t_near = t0.min(t1).max_element().max(0.0);
    let t_far = t0.max(t1).min_element();
    (t_near < t_far).then_some((t_near, t_far))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::model::{ReconstructionModel, SceneCode};

    struct RedSphere;

    impl ReconstructionModel for RedSphere {
        fn id(&self) -> &str {
            "test/red-sphere"
        }

        fn supports_device(&self, _device: &Device) -> bool {
            true
        }

        fn encode(&self, _image: &RgbImage, _device: &Device) -> Result<SceneCode, ModelError> {
            Ok(SceneCode::new(1, 1, 1))
        }

        fn query_density(&self, _scene: &SceneCode, points: &[Vec3]) -> Result<Vec<f32>, ModelError> {
            Ok(points.iter().map(|p| 0.5 - p.length()).collect())
        }

        fn query_color(&self, _scene: &SceneCode, points: &[Vec3]) -> Result<Vec<Vec3>, ModelError> {
            Ok(vec![Vec3::X; points.len()])
        }
    }

    fn render(size: u32) -> RgbImage {
        let scene = SceneCode::new(1, 1, 1);
        let sampler = FieldSampler::new(&RedSphere, &scene, 4096);
        render_preview(&sampler, size).unwrap()
    }

    #[test]
    fn test_front_view_camera() {
        let eye = PreviewRenderer::default().camera_position();
        assert!((eye - Vec3::new(0.0, 0.0, 1.9)).length() < 1e-6);

        let side = PreviewRenderer::default().with_azimuth(90.0).camera_position();
        assert!((side - Vec3::new(1.9, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_sphere_silhouette() {
        let image = render(64);
        assert_eq!(image.dimensions(), (64, 64));

        let center = image.get_pixel(32, 32);
        assert!(center[0] > 150 && center[1] == 0 && center[2] == 0);
        assert_eq!(*image.get_pixel(0, 0), PREVIEW_BACKGROUND);
    }

    #[test]
    fn test_shading_darkens_toward_rim() {
        let image = render(64);
        // Light comes from above-right of the camera, so the lower-left rim is darker
        let center = image.get_pixel(32, 32)[0];
        let rim = image.get_pixel(20, 44)[0];
        assert!(rim < center, "rim {rim} should be darker than center {center}");
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render(32), render(32));
    }

    #[test]
    fn test_cube_intersection() {
        let hit = intersect_cube(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z, 1.0).unwrap();
        assert!((hit.0 - 1.0).abs() < 1e-6 && (hit.1 - 3.0).abs() < 1e-6);
        assert!(intersect_cube(Vec3::new(0.0, 2.0, 2.0), -Vec3::Z, 1.0).is_none());
    }
}
