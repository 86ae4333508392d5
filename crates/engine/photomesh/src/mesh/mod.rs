// Mesh representation, extraction and export

pub mod glb;
pub mod isosurface;
pub mod texture;

pub use glb::{export_glb, inspect_glb, GlbError, GlbSummary};
pub use isosurface::extract_isosurface;
pub use texture::bake_texture;

use glam::Vec3;
use image::RgbImage;

/// Indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Per-vertex linear RGB (0.0-1.0)
    pub colors: Option<Vec<[f32; 3]>>,
    /// Per-vertex texture coordinates, present together with `texture`
    pub uvs: Option<Vec<[f32; 2]>>,
    pub texture: Option<RgbImage>,
    /// Triangle list, counter-clockwise front faces
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vertex and return its index
    pub fn push_vertex(&mut self, position: Vec3) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(position.to_array());
        index
    }

    /// Append a quad (counter-clockwise) as two triangles (0,1,2) and (0,2,3)
    pub fn push_quad(&mut self, quad: [u32; 4]) {
        self.indices
            .extend_from_slice(&[quad[0], quad[1], quad[2], quad[0], quad[2], quad[3]]);
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn has_vertex_colors(&self) -> bool {
        self.colors.is_some()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    /// Axis-aligned bounds of all vertices
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.positions.iter().map(|p| Vec3::from_array(*p));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    /// Area-weighted vertex normals from the triangle list
    pub fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let pa = Vec3::from_array(self.positions[a]);
            let pb = Vec3::from_array(self.positions[b]);
            let pc = Vec3::from_array(self.positions[c]);
            // Cross product length is twice the area, which is the weight we want
            let n = (pb - pa).cross(pc - pa);
            accum[a] += n;
            accum[b] += n;
            accum[c] += n;
        }
        self.normals = accum
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> Mesh {
        let mut mesh = Mesh::new();
        let a = mesh.push_vertex(Vec3::new(0.0, 0.0, 0.0));
        let b = mesh.push_vertex(Vec3::new(1.0, 0.0, 0.0));
        let c = mesh.push_vertex(Vec3::new(1.0, 1.0, 0.0));
        let d = mesh.push_vertex(Vec3::new(0.0, 1.0, 0.0));
        mesh.push_quad([a, b, c, d]);
        mesh
    }

    #[test]
    fn test_quad_becomes_two_triangles() {
        let mesh = unit_quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_normals_follow_winding() {
        let mut mesh = unit_quad();
        mesh.compute_normals();
        assert_eq!(mesh.normals.len(), 4);
        for n in &mesh.normals {
            assert!((n[2] - 1.0).abs() < 1e-6, "CCW quad in xy faces +z");
        }
    }

    #[test]
    fn test_bounds() {
        let mesh = unit_quad();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::new(1.0, 1.0, 0.0));
        assert!(Mesh::new().bounds().is_none());
    }
}
