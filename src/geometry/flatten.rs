use glam::{Mat3, Mat4, Vec3};
use tracing::debug;

use crate::scene::{MeshGeometry, SceneNode};

/// Non-indexed triangle soup carrying positions and normals only.
/// Every three consecutive vertices form one triangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl FlatMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn append(&mut self, other: &FlatMesh) {
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), &p| (min.min(p), max.max(p))),
        )
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.positions {
            *p += offset;
        }
    }

    /// Interleaved `[position, normal]` pairs, the vertex layout of the
    /// shaded pipelines.
    pub fn interleaved(&self) -> Vec<[[f32; 3]; 2]> {
        self.positions
            .iter()
            .zip(&self.normals)
            .map(|(p, n)| [p.to_array(), n.to_array()])
            .collect()
    }
}

/// The merged geometry plus the translation of its wrapping group: adding
/// `translation` to the centered vertices gives their baked world positions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenedModel {
    pub mesh: FlatMesh,
    pub translation: Vec3,
}

impl FlattenedModel {
    pub fn group_transform(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
    }
}

/// Bakes `world` into one mesh and expands its index buffer.
pub fn bake_mesh(geometry: &MeshGeometry, world: Mat4) -> FlatMesh {
    let normal_matrix = normal_matrix(world);
    let triangles = geometry.triangle_vertex_ids();
    let mut out = FlatMesh {
        positions: Vec::with_capacity(triangles.len() * 3),
        normals: Vec::with_capacity(triangles.len() * 3),
    };

    let normals = geometry
        .normals
        .as_ref()
        .filter(|n| n.len() == geometry.positions.len());

    for ids in triangles {
        let p = ids.map(|i| world.transform_point3(Vec3::from(geometry.positions[i])));
        out.positions.extend_from_slice(&p);
        match normals {
            Some(normals) => {
                for i in ids {
                    out.normals
                        .push((normal_matrix * Vec3::from(normals[i])).normalize_or_zero());
                }
            }
            None => {
                let face = (p[1] - p[0]).cross(p[2] - p[0]).normalize_or_zero();
                out.normals.extend_from_slice(&[face; 3]);
            }
        }
    }
    out
}

fn normal_matrix(world: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(world);
    if linear.determinant().abs() <= f32::EPSILON {
        return linear;
    }
    linear.inverse().transpose()
}

/// Merges every mesh of `root` into one geometry centered on its bounding box.
pub fn flatten_scene(root: &mut SceneNode) -> FlattenedModel {
    root.update_world_transforms();

    let mut mesh = FlatMesh::default();
    for (world, node) in root.meshes() {
        mesh.append(&bake_mesh(&node.geometry, world));
    }

    let translation = match mesh.bounds() {
        Some((min, max)) => (min + max) * 0.5,
        None => Vec3::ZERO,
    };
    mesh.translate(-translation);

    debug!(
        triangles = mesh.triangle_count(),
        center = ?translation,
        "flattened scene"
    );
    FlattenedModel { mesh, translation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::demo::box_geometry;
    use crate::scene::{MeshNode, NodeKind};
    use approx::assert_relative_eq;

    fn cube_scene(offset: Vec3) -> SceneNode {
        SceneNode::group("root").with_child(
            SceneNode::mesh("cube", MeshNode::new(box_geometry(Vec3::ONE))).with_translation(offset),
        )
    }

    #[test]
    fn translated_cube_flattens_to_recentered_cube() {
        let plain = flatten_scene(&mut cube_scene(Vec3::ZERO));
        let moved = flatten_scene(&mut cube_scene(Vec3::new(1.0, 0.0, 0.0)));

        assert_eq!(plain.mesh.vertex_count(), 36);
        assert_eq!(plain.mesh.vertex_count(), moved.mesh.vertex_count());
        for (a, b) in plain.mesh.positions.iter().zip(&moved.mesh.positions) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
            assert_relative_eq!(a.z, b.z, epsilon = 1e-6);
        }
        assert_relative_eq!(moved.translation.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_scene_yields_empty_geometry() {
        let flattened = flatten_scene(&mut SceneNode::group("empty"));
        assert!(flattened.mesh.is_empty());
        assert_eq!(flattened.translation, Vec3::ZERO);
    }

    #[test]
    fn missing_normals_are_synthesized_from_faces() {
        let geometry = MeshGeometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            ..Default::default()
        };
        let mut root = SceneNode::new("tri", NodeKind::Mesh(MeshNode::new(geometry)));
        let flattened = flatten_scene(&mut root);
        assert_eq!(flattened.mesh.normals, vec![Vec3::Z; 3]);
    }

    #[test]
    fn normals_use_the_inverse_transpose() {
        let geometry = MeshGeometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: Some(vec![[1.0, 1.0, 0.0]; 3]),
            ..Default::default()
        };
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let baked = bake_mesh(&geometry, world);
        let expected = Vec3::new(0.5, 1.0, 0.0).normalize();
        assert_relative_eq!(baked.normals[0].x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(baked.normals[0].y, expected.y, epsilon = 1e-6);
        assert_relative_eq!(baked.positions[1].x, 2.0);
    }
}
