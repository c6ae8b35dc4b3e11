use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::debug;

use super::weld::WeldedMesh;

pub const DEFAULT_THRESHOLD_DEG: f32 = 40.0;
pub const MAX_THRESHOLD_DEG: f32 = 120.0;

// Coplanar faces can compute a dot product a hair above 1.0.
const DOT_EPSILON: f32 = 1e-6;

/// One line instance: a pair of endpoints in model space.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
}

impl LineSegment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self {
            start: start.to_array(),
            end: end.to_array(),
        }
    }
}

/// A triangle using an edge, with the corner not on the edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct EdgeUse {
    pub triangle: usize,
    pub opposite: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EdgeRecord {
    /// Endpoints in the winding order of the first triangle that used them.
    pub a: u32,
    pub b: u32,
    pub uses: Vec<EdgeUse>,
}

/// Edge to triangle incidence over the non-degenerate triangles of a mesh,
/// in first-seen order so extraction output is deterministic.
#[derive(Clone, Debug, Default)]
pub(crate) struct EdgeAdjacency {
    pub face_normals: Vec<Option<Vec3>>,
    pub edges: Vec<EdgeRecord>,
}

impl EdgeAdjacency {
    pub fn build(mesh: &WeldedMesh) -> Self {
        let face_normals: Vec<Option<Vec3>> =
            mesh.triangles.iter().map(|&t| mesh.face_normal(t)).collect();

        let mut lookup: HashMap<(u32, u32), usize> = HashMap::new();
        let mut edges: Vec<EdgeRecord> = Vec::new();

        for (triangle, &[i0, i1, i2]) in mesh.triangles.iter().enumerate() {
            if face_normals[triangle].is_none() {
                continue;
            }
            for (a, b, opposite) in [(i0, i1, i2), (i1, i2, i0), (i2, i0, i1)] {
                let key = (a.min(b), a.max(b));
                let slot = *lookup.entry(key).or_insert_with(|| {
                    edges.push(EdgeRecord { a, b, uses: Vec::with_capacity(2) });
                    edges.len() - 1
                });
                edges[slot].uses.push(EdgeUse { triangle, opposite });
            }
        }

        Self { face_normals, edges }
    }

    pub fn normal(&self, edge_use: EdgeUse) -> Vec3 {
        self.face_normals[edge_use.triangle].unwrap_or(Vec3::ZERO)
    }
}

/// Boundary edges always, interior edges whose faces meet at `threshold_deg`
/// or more. A threshold of zero keeps every edge.
pub fn extract_hard_edges(mesh: &WeldedMesh, threshold_deg: f32) -> Vec<LineSegment> {
    let adjacency = EdgeAdjacency::build(mesh);
    let threshold_dot = threshold_deg.clamp(0.0, 180.0).to_radians().cos() + DOT_EPSILON;

    let segments: Vec<LineSegment> = adjacency
        .edges
        .iter()
        .filter(|edge| match edge.uses.as_slice() {
            [_] => true,
            uses => uses.iter().enumerate().any(|(i, &first)| {
                uses[i + 1..].iter().any(|&second| {
                    adjacency.normal(first).dot(adjacency.normal(second)) <= threshold_dot
                })
            }),
        })
        .map(|edge| {
            LineSegment::new(mesh.vertices[edge.a as usize], mesh.vertices[edge.b as usize])
        })
        .collect();

    debug!(threshold_deg, edges = segments.len(), "extracted hard edges");
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::flatten::FlatMesh;
    use crate::geometry::weld::WELD_EPSILON;
    use crate::scene::demo::box_geometry;
    use crate::geometry::flatten::bake_mesh;
    use glam::Mat4;

    fn welded(positions: &[[f32; 3]]) -> WeldedMesh {
        let flat = FlatMesh {
            positions: positions.iter().map(|&p| Vec3::from(p)).collect(),
            normals: vec![Vec3::Z; positions.len()],
        };
        WeldedMesh::from_flat(&flat, WELD_EPSILON)
    }

    fn quad() -> WeldedMesh {
        welded(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ])
    }

    fn cube() -> WeldedMesh {
        let flat = bake_mesh(&box_geometry(Vec3::ONE), Mat4::IDENTITY);
        WeldedMesh::from_flat(&flat, WELD_EPSILON)
    }

    #[test]
    fn single_triangle_always_has_three_edges() {
        let mesh = welded(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        for threshold in [0.0, 10.0, 40.0, 90.0, 120.0] {
            assert_eq!(extract_hard_edges(&mesh, threshold).len(), 3);
        }
    }

    #[test]
    fn coplanar_quad_keeps_its_diagonal_only_at_zero() {
        let mesh = quad();
        assert_eq!(extract_hard_edges(&mesh, 10.0).len(), 4);
        assert_eq!(extract_hard_edges(&mesh, 0.0).len(), 5);
    }

    #[test]
    fn edge_count_never_grows_with_threshold() {
        let mesh = cube();
        let mut previous = usize::MAX;
        for threshold in [0.0, 10.0, 45.0, 89.0, 90.0, 91.0, 120.0] {
            let count = extract_hard_edges(&mesh, threshold).len();
            assert!(count <= previous, "{count} > {previous} at {threshold}");
            previous = count;
        }
        assert_eq!(extract_hard_edges(&mesh, 0.0).len(), 18);
        assert_eq!(extract_hard_edges(&mesh, 40.0).len(), 12);
        assert_eq!(extract_hard_edges(&mesh, 91.0).len(), 0);
    }

    #[test]
    fn non_manifold_edge_is_emitted_once() {
        // Three fins sharing the edge (0,0,0)-(0,1,0).
        let mesh = welded(&[
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let shared = extract_hard_edges(&mesh, 40.0)
            .into_iter()
            .filter(|s| s.start[0] == 0.0 && s.end[0] == 0.0 && s.start[2] == 0.0 && s.end[2] == 0.0)
            .count();
        assert_eq!(shared, 1);
    }

    #[test]
    fn degenerate_triangles_contribute_nothing() {
        let mesh = WeldedMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0],
            triangles: vec![[0, 1, 2]],
        };
        assert!(extract_hard_edges(&mesh, 0.0).is_empty());
    }
}
