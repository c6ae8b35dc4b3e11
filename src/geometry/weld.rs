use std::collections::HashMap;

use glam::Vec3;
use tracing::debug;

use super::flatten::FlatMesh;

/// Distance under which two vertices are treated as one.
pub const WELD_EPSILON: f32 = 1e-4;

/// Indexed form of a [`FlatMesh`] with coincident vertices merged, so
/// triangles that share an edge also share its vertex ids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeldedMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl WeldedMesh {
    /// Merges vertices within `epsilon` using a spatial hash with cells of
    /// `2 * epsilon`, searching the 27 neighbouring cells. The first vertex
    /// seen at a location is the one kept. Triangles that collapse after
    /// merging are dropped.
    pub fn from_flat(mesh: &FlatMesh, epsilon: f32) -> Self {
        let epsilon = epsilon.max(f32::MIN_POSITIVE);
        let cell_size = epsilon * 2.0;
        let epsilon_sq = epsilon * epsilon;

        let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
        let mut vertices: Vec<Vec3> = Vec::new();
        let mut remap = Vec::with_capacity(mesh.positions.len());

        for &p in &mesh.positions {
            let cell = cell_of(p, cell_size);
            let mut found = None;
            'search: for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let key = (cell.0 + dx, cell.1 + dy, cell.2 + dz);
                        let Some(bucket) = grid.get(&key) else {
                            continue;
                        };
                        for &candidate in bucket {
                            if vertices[candidate as usize].distance_squared(p) <= epsilon_sq {
                                found = Some(candidate);
                                break 'search;
                            }
                        }
                    }
                }
            }

            let id = match found {
                Some(id) => id,
                None => {
                    let id = vertices.len() as u32;
                    vertices.push(p);
                    grid.entry(cell).or_default().push(id);
                    id
                }
            };
            remap.push(id);
        }

        let triangles: Vec<[u32; 3]> = remap
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .filter(|[a, b, c]| a != b && b != c && a != c)
            .collect();

        debug!(
            input = mesh.positions.len(),
            welded = vertices.len(),
            triangles = triangles.len(),
            "welded vertices"
        );
        Self { vertices, triangles }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn corners(&self, triangle: [u32; 3]) -> [Vec3; 3] {
        triangle.map(|i| self.vertices[i as usize])
    }

    /// Unit face normal, or `None` for a zero-area triangle.
    pub fn face_normal(&self, triangle: [u32; 3]) -> Option<Vec3> {
        let [a, b, c] = self.corners(triangle);
        let n = (b - a).cross(c - a);
        let len = n.length();
        // Relative to the edge lengths so tiny but valid triangles survive.
        let scale = (b - a).length() * (c - a).length();
        (len > 0.0 && len > scale * 1e-6).then(|| n / len)
    }
}

fn cell_of(p: Vec3, cell_size: f32) -> (i64, i64, i64) {
    (
        (p.x / cell_size).floor() as i64,
        (p.y / cell_size).floor() as i64,
        (p.z / cell_size).floor() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(positions: &[[f32; 3]]) -> FlatMesh {
        FlatMesh {
            positions: positions.iter().map(|&p| Vec3::from(p)).collect(),
            normals: vec![Vec3::Z; positions.len()],
        }
    }

    #[test]
    fn shared_corners_are_merged() {
        let mesh = flat(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.00005],
            [0.0, 1.0, 0.0],
        ]);
        let welded = WeldedMesh::from_flat(&mesh, WELD_EPSILON);
        assert_eq!(welded.vertices.len(), 4);
        assert_eq!(welded.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn collapsed_triangles_are_dropped() {
        let mesh = flat(&[
            [0.0, 0.0, 0.0],
            [0.00001, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ]);
        let welded = WeldedMesh::from_flat(&mesh, WELD_EPSILON);
        assert!(welded.is_empty());
    }

    #[test]
    fn distant_vertices_stay_apart() {
        let mesh = flat(&[[0.0, 0.0, 0.0], [0.001, 0.0, 0.0], [0.0, 0.001, 0.0]]);
        let welded = WeldedMesh::from_flat(&mesh, WELD_EPSILON);
        assert_eq!(welded.vertices.len(), 3);
        assert!(welded.face_normal(welded.triangles[0]).is_some());
    }

    #[test]
    fn colinear_triangle_has_no_normal() {
        let welded = WeldedMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0],
            triangles: vec![[0, 1, 2]],
        };
        assert_eq!(welded.face_normal([0, 1, 2]), None);
    }
}
