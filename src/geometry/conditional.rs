use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use tracing::debug;

use super::edges::EdgeAdjacency;
use super::weld::WeldedMesh;

/// An edge whose visibility is decided per frame from the two corners
/// opposite it. For a boundary edge `control1` repeats `start`, which makes
/// the test fail; those edges are drawn by the hard-edge pass instead.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ConditionalSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub control0: [f32; 3],
    pub control1: [f32; 3],
}

impl ConditionalSegment {
    pub fn is_boundary(&self) -> bool {
        self.control1 == self.start
    }

    /// CPU mirror of the conditional line shader: the edge is drawn when both
    /// control points project to the same side of the projected edge.
    pub fn is_visible(&self, view_proj: Mat4) -> bool {
        let project = |p: [f32; 3]| {
            let clip = view_proj * Vec4::from((Vec3::from(p), 1.0));
            Vec2::new(clip.x, clip.y) / clip.w
        };
        let start = project(self.start);
        let end = project(self.end);
        let c0 = project(self.control0);
        let c1 = project(self.control1);

        let dir = end - start;
        let norm = Vec2::new(-dir.y, dir.x);
        side(norm.dot(c0 - start)) == side(norm.dot(c1 - start))
    }
}

// Matches WGSL `sign`: zero maps to zero.
fn side(value: f32) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// One instance per edge of the welded mesh, independent of any threshold.
/// Non-manifold edges use their first two triangles.
pub fn extract_conditional_edges(mesh: &WeldedMesh) -> Vec<ConditionalSegment> {
    let adjacency = EdgeAdjacency::build(mesh);
    let vertex = |i: u32| mesh.vertices[i as usize].to_array();

    let segments: Vec<ConditionalSegment> = adjacency
        .edges
        .iter()
        .filter_map(|edge| {
            let first = edge.uses.first()?;
            let start = vertex(edge.a);
            let control1 = edge.uses.get(1).map_or(start, |second| vertex(second.opposite));
            Some(ConditionalSegment {
                start,
                end: vertex(edge.b),
                control0: vertex(first.opposite),
                control1,
            })
        })
        .collect();

    debug!(edges = segments.len(), "extracted conditional edges");
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cylinder_like_edge() -> ConditionalSegment {
        // Shared edge along Y at x = 1, neighbours bending away in -z and +z.
        ConditionalSegment {
            start: [1.0, -0.5, 0.0],
            end: [1.0, 0.5, 0.0],
            control0: [0.8, 0.0, -0.6],
            control1: [0.8, 0.0, 0.6],
        }
    }

    fn view_proj(eye: Vec3) -> Mat4 {
        Mat4::perspective_rh(40f32.to_radians(), 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn silhouette_edge_is_visible_only_from_the_side() {
        let edge = cylinder_like_edge();
        // Looking down -z the edge sits on the outline of the curved surface.
        assert!(edge.is_visible(view_proj(Vec3::new(0.0, 0.0, 5.0))));
        // Looking along -x at the edge both neighbours fan out to either side.
        assert!(!edge.is_visible(view_proj(Vec3::new(5.0, 0.0, 0.0))));
    }

    #[test]
    fn boundary_edges_never_pass() {
        let mut edge = cylinder_like_edge();
        edge.control1 = edge.start;
        assert!(edge.is_boundary());
        for eye in [Vec3::new(0.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 0.0), Vec3::new(3.0, 2.0, 3.0)] {
            assert!(!edge.is_visible(view_proj(eye)));
        }
    }

    #[test]
    fn quad_has_four_boundary_and_one_interior_edge() {
        let mesh = WeldedMesh {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        };
        let segments = extract_conditional_edges(&mesh);
        assert_eq!(segments.len(), 5);
        assert_eq!(segments.iter().filter(|s| s.is_boundary()).count(), 4);

        let diagonal = segments.iter().find(|s| !s.is_boundary()).unwrap();
        assert_eq!(diagonal.control0, [1.0, 0.0, 0.0]);
        assert_eq!(diagonal.control1, [0.0, 1.0, 0.0]);
    }
}
