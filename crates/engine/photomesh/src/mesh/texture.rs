//! Texture baking
//!
//! Assigns planar UVs by projecting the mesh onto the view plane (x right,
//! y up) and fills a square texture with colours queried at the front-most
//! surface point under every texel. Texels no triangle covers stay gray.

use super::Mesh;
use crate::model::{FieldSampler, ModelError};
use glam::{Vec2, Vec3};
use image::{Rgb, RgbImage};

/// Fill for texels outside every triangle
pub const UNCOVERED_TEXEL: Rgb<u8> = Rgb([127, 127, 127]);

/// Bake a `resolution` x `resolution` colour texture into `mesh`
///
/// Sets `mesh.uvs` and `mesh.texture`. Vertex colours, if any, are untouched.
pub fn bake_texture(
    sampler: &FieldSampler<'_>,
    mesh: &mut Mesh,
    resolution: u32,
) -> Result<(), ModelError> {
    let size = resolution.max(1);
    let Some((min, max)) = mesh.bounds() else {
        return Err(ModelError::EmptySurface(resolution));
    };
    let width = (max.x - min.x).max(f32::EPSILON);
    let height = (max.y - min.y).max(f32::EPSILON);

    let uvs: Vec<[f32; 2]> = mesh
        .positions
        .iter()
        .map(|p| [(p[0] - min.x) / width, (max.y - p[1]) / height])
        .collect();

    let texels = (size as usize) * (size as usize);
    let mut depth = vec![f32::NEG_INFINITY; texels];
    let mut hits = vec![Vec3::ZERO; texels];

    for tri in mesh.indices.chunks_exact(3) {
        let corners = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let uv = corners.map(|i| Vec2::from_array(uvs[i]) * size as f32);
        let pos = corners.map(|i| Vec3::from_array(mesh.positions[i]));
        rasterize(size, uv, pos, &mut depth, &mut hits);
    }

    let covered: Vec<usize> = (0..texels).filter(|i| depth[*i].is_finite()).collect();
    let points: Vec<Vec3> = covered.iter().map(|i| hits[*i]).collect();
    let colors = sampler.color(&points)?;

    let mut texture = RgbImage::from_pixel(size, size, UNCOVERED_TEXEL);
    for (index, color) in covered.iter().zip(colors) {
        let x = (*index % size as usize) as u32;
        let y = (*index / size as usize) as u32;
        texture.put_pixel(x, y, to_rgb8(color));
    }

    tracing::debug!(
        resolution = size,
        covered = covered.len(),
        "baked texture"
    );
    mesh.uvs = Some(uvs);
    mesh.texture = Some(texture);
    Ok(())
}

pub(crate) fn to_rgb8(color: Vec3) -> Rgb<u8> {
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    Rgb([c.x as u8, c.y as u8, c.z as u8])
}

/// Scan-convert one triangle in texel space, keeping the largest z per texel
fn rasterize(size: u32, uv: [Vec2; 3], pos: [Vec3; 3], depth: &mut [f32], hits: &mut [Vec3]) {
    let [a, b, c] = uv;
    let area = edge(a, b, c);
    if area.abs() < 1e-12 {
        return;
    }

    let lo = a.min(b).min(c).floor().max(Vec2::ZERO);
    let hi = a.max(b).max(c).ceil().min(Vec2::splat(size as f32));

    for y in lo.y as u32..hi.y as u32 {
        for x in lo.x as u32..hi.x as u32 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(b, c, p) / area;
            let w1 = edge(c, a, p) / area;
            let w2 = edge(a, b, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let point = pos[0] * w0 + pos[1] * w1 + pos[2] * w2;
            let i = y as usize * size as usize + x as usize;
            if point.z > depth[i] {
                depth[i] = point.z;
                hits[i] = point;
            }
        }
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}
