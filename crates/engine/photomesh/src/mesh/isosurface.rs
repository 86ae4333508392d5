//! Isosurface extraction (surface nets)
//!
//! Samples the density field on a `resolution`³ lattice spanning the model's
//! bounding cube and places one vertex in every cell the surface passes
//! through, at the average of the cell's edge crossings. Every lattice edge
//! with a sign change becomes a quad joining the four cells around it.
//!
//! The lattice is walked one z-slice at a time, so only two density slices and
//! two layers of cell vertices are alive at once regardless of resolution.

use super::Mesh;
use crate::model::{FieldSampler, ModelError};
use glam::Vec3;

const NO_VERTEX: u32 = u32::MAX;

/// The 12 cell edges as corner pairs; corner index is `dx + 2*dy + 4*dz`
const CELL_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

fn corner_offset(corner: usize) -> Vec3 {
    Vec3::new(
        (corner & 1) as f32,
        ((corner >> 1) & 1) as f32,
        ((corner >> 2) & 1) as f32,
    )
}

/// Extract the `iso_level` surface of the sampler's density field.
///
/// Returns geometry with vertex normals; colours are left to the caller.
pub fn extract_isosurface(sampler: &FieldSampler<'_>, resolution: u32) -> Result<Mesh, ModelError> {
    let n = resolution.max(2) as usize;
    let cells = n - 1;
    let radius = sampler.bounding_radius();
    let iso = sampler.iso_level();
    let step = 2.0 * radius / cells as f32;

    let point_index = |i: usize, j: usize| j * n + i;
    let cell_index = |i: usize, j: usize| j * cells + i;
    let slice_points = |k: usize| -> Vec<Vec3> {
        let z = -radius + k as f32 * step;
        (0..n)
            .flat_map(|j| {
                (0..n).map(move |i| Vec3::new(-radius + i as f32 * step, -radius + j as f32 * step, z))
            })
            .collect()
    };

    let mut mesh = Mesh::new();
    let mut below = sampler.density(&slice_points(0))?;
    let mut previous_layer = vec![NO_VERTEX; cells * cells];

    for k in 0..cells {
        let above = sampler.density(&slice_points(k + 1))?;
        let mut layer = vec![NO_VERTEX; cells * cells];

        // One vertex per cell that straddles the surface
        for j in 0..cells {
            for i in 0..cells {
                let values = [
                    below[point_index(i, j)],
                    below[point_index(i + 1, j)],
                    below[point_index(i, j + 1)],
                    below[point_index(i + 1, j + 1)],
                    above[point_index(i, j)],
                    above[point_index(i + 1, j)],
                    above[point_index(i, j + 1)],
                    above[point_index(i + 1, j + 1)],
                ];
                let inside_count = values.iter().filter(|v| **v > iso).count();
                if inside_count == 0 || inside_count == 8 {
                    continue;
                }

                let mut sum = Vec3::ZERO;
                let mut crossings = 0.0;
                for (a, b) in CELL_EDGES {
                    if (values[a] > iso) != (values[b] > iso) {
                        let t = (iso - values[a]) / (values[b] - values[a]);
                        let pa = corner_offset(a);
                        sum += pa + (corner_offset(b) - pa) * t;
                        crossings += 1.0;
                    }
                }
                let local = sum / crossings;
                let position = Vec3::new(
                    -radius + (i as f32 + local.x) * step,
                    -radius + (j as f32 + local.y) * step,
                    -radius + (k as f32 + local.z) * step,
                );
                layer[cell_index(i, j)] = mesh.push_vertex(position);
            }
        }

        // Edges along z between slice k and k+1
        for j in 1..cells {
            for i in 1..cells {
                let p = point_index(i, j);
                emit_quad(
                    &mut mesh,
                    below[p] > iso,
                    above[p] > iso,
                    [
                        layer[cell_index(i - 1, j - 1)],
                        layer[cell_index(i, j - 1)],
                        layer[cell_index(i, j)],
                        layer[cell_index(i - 1, j)],
                    ],
                );
            }
        }

        // Edges along x and y inside slice k need the cell layer below it
        if k > 0 {
            for j in 1..cells {
                for i in 0..cells {
                    emit_quad(
                        &mut mesh,
                        below[point_index(i, j)] > iso,
                        below[point_index(i + 1, j)] > iso,
                        [
                            previous_layer[cell_index(i, j - 1)],
                            previous_layer[cell_index(i, j)],
                            layer[cell_index(i, j)],
                            layer[cell_index(i, j - 1)],
                        ],
                    );
                }
            }
            for j in 0..cells {
                for i in 1..cells {
                    emit_quad(
                        &mut mesh,
                        below[point_index(i, j)] > iso,
                        below[point_index(i, j + 1)] > iso,
                        [
                            previous_layer[cell_index(i - 1, j)],
                            layer[cell_index(i - 1, j)],
                            layer[cell_index(i, j)],
                            previous_layer[cell_index(i, j)],
                        ],
                    );
                }
            }
        }

        below = above;
        previous_layer = layer;
    }

    if mesh.is_empty() {
        return Err(ModelError::EmptySurface(resolution));
    }

    mesh.compute_normals();
    tracing::debug!(
        resolution,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "extracted isosurface"
    );
    Ok(mesh)
}

/// Emit the quad around an edge whose endpoints differ in sign.
///
/// `quad` is ordered counter-clockwise as seen from the positive end of the
/// edge axis; it is flipped when the inside lies on the positive end.
fn emit_quad(mesh: &mut Mesh, start_inside: bool, end_inside: bool, quad: [u32; 4]) {
    if start_inside == end_inside {
        return;
    }
    debug_assert!(quad.iter().all(|v| *v != NO_VERTEX));
    if start_inside {
        mesh.push_quad(quad);
    } else {
        mesh.push_quad([quad[0], quad[3], quad[2], quad[1]]);
    }
}
