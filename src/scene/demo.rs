//! Procedural default model shown until something is loaded.

use std::f32::consts::TAU;

use glam::{Mat4, Quat, Vec3};

use super::{MeshGeometry, MeshNode, SceneNode};

const CYLINDER_SEGMENTS: u32 = 24;

pub fn demo_scene() -> SceneNode {
    let cube = MeshNode::new(box_geometry(Vec3::splat(0.8))).with_color([0.85, 0.55, 0.35, 1.0]);
    let cylinder = MeshNode::new(cylinder_geometry(0.35, 1.0, CYLINDER_SEGMENTS))
        .with_color([0.35, 0.55, 0.85, 1.0]);

    SceneNode::group("demo")
        .with_child(SceneNode::mesh("box", cube).with_translation(Vec3::new(-0.6, 0.0, 0.0)))
        .with_child(
            SceneNode::mesh("cylinder", cylinder).with_transform(Mat4::from_rotation_translation(
                Quat::from_rotation_z(0.35),
                Vec3::new(0.6, 0.0, 0.0),
            )),
        )
}

/// Axis-aligned box centered at the origin, 24 vertices with per-face normals.
pub fn box_geometry(size: Vec3) -> MeshGeometry {
    let h = size * 0.5;
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
        (Vec3::Z, Vec3::Y, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, up, right) in faces {
        let base = positions.len() as u32;
        let center = normal * h;
        let up = up * h;
        let right = right * h;
        for corner in [-right - up, right - up, right + up, -right + up] {
            positions.push((center + corner).to_array());
            normals.push(normal.to_array());
        }
        // Counter-clockwise when viewed from outside.
        let (a, b, c) = if right.cross(up).dot(normal) >= 0.0 { (1, 2, 3) } else { (3, 2, 1) };
        indices.extend_from_slice(&[base, base + a, base + b, base, base + b, base + c]);
    }

    MeshGeometry {
        positions,
        normals: Some(normals),
        indices: Some(indices),
        ..Default::default()
    }
}

/// Capped cylinder along +Y, smooth side normals and flat caps.
pub fn cylinder_geometry(radius: f32, height: f32, segments: u32) -> MeshGeometry {
    let segments = segments.max(3);
    let half = height * 0.5;
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut indices = Vec::new();

    for i in 0..=segments {
        let angle = i as f32 / segments as f32 * TAU;
        let (sin, cos) = angle.sin_cos();
        let normal = [cos, 0.0, sin];
        positions.push([cos * radius, -half, sin * radius]);
        normals.push(normal);
        positions.push([cos * radius, half, sin * radius]);
        normals.push(normal);
    }
    for i in 0..segments {
        let b0 = i * 2;
        let t0 = b0 + 1;
        let b1 = b0 + 2;
        let t1 = b0 + 3;
        indices.extend_from_slice(&[b0, t0, b1, b1, t0, t1]);
    }

    for (y, ny) in [(half, 1.0_f32), (-half, -1.0)] {
        let center = positions.len() as u32;
        positions.push([0.0, y, 0.0]);
        normals.push([0.0, ny, 0.0]);
        for i in 0..segments {
            let angle = i as f32 / segments as f32 * TAU;
            let (sin, cos) = angle.sin_cos();
            positions.push([cos * radius, y, sin * radius]);
            normals.push([0.0, ny, 0.0]);
        }
        for i in 0..segments {
            let a = center + 1 + i;
            let b = center + 1 + (i + 1) % segments;
            if ny > 0.0 {
                indices.extend_from_slice(&[center, b, a]);
            } else {
                indices.extend_from_slice(&[center, a, b]);
            }
        }
    }

    MeshGeometry {
        positions,
        normals: Some(normals),
        indices: Some(indices),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_has_twelve_outward_triangles() {
        let geometry = box_geometry(Vec3::ONE);
        assert_eq!(geometry.triangle_count(), 12);
        for [a, b, c] in geometry.triangle_vertex_ids() {
            let pa = Vec3::from(geometry.positions[a]);
            let pb = Vec3::from(geometry.positions[b]);
            let pc = Vec3::from(geometry.positions[c]);
            let face = (pb - pa).cross(pc - pa);
            let centroid = (pa + pb + pc) / 3.0;
            assert!(face.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn demo_scene_has_two_meshes() {
        let mut scene = demo_scene();
        scene.update_world_transforms();
        assert_eq!(scene.meshes().len(), 2);
        assert_eq!(scene.triangle_count(), 12 + CYLINDER_SEGMENTS as usize * 4);
    }
}
