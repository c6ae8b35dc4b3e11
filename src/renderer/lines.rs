//! Screen-space thick lines.
//!
//! Each segment instance is drawn as a six-vertex quad whose corners are
//! pushed apart in clip space so the line keeps a constant pixel width.
//! `screen_offset` is the CPU mirror of the vertex shader expansion.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use crate::viewer::variants::MaterialId;

/// Per-variant style state of a line model. Written to the GPU every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LineMaterial {
    pub id: MaterialId,
    /// Linear RGBA.
    pub color: [f32; 4],
    /// Width in physical pixels.
    pub linewidth: f32,
    /// Viewport size in physical pixels.
    pub resolution: Vec2,
    pub visible: bool,
}

impl LineMaterial {
    pub fn new(id: MaterialId) -> Self {
        Self {
            id,
            color: [0.0, 0.0, 0.0, 1.0],
            linewidth: 1.0,
            resolution: Vec2::ONE,
            visible: true,
        }
    }

    pub fn uniform(&self) -> LineUniform {
        LineUniform {
            color: self.color,
            resolution: self.resolution.max(Vec2::ONE).to_array(),
            linewidth: self.linewidth,
            _padding: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineUniform {
    pub color: [f32; 4],
    pub resolution: [f32; 2],
    pub linewidth: f32,
    pub _padding: f32,
}

/// Clip-space offset of the corner on the `side` (+1 or -1) of a segment,
/// divided by `w`. Perpendicular in pixel space with length `linewidth / 2`
/// pixels.
pub fn screen_offset(start_ndc: Vec2, end_ndc: Vec2, resolution: Vec2, linewidth: f32, side: f32) -> Vec2 {
    let aspect = resolution.x / resolution.y;
    let mut dir = end_ndc - start_ndc;
    dir.x *= aspect;
    let dir = dir.normalize_or_zero();

    let mut offset = Vec2::new(dir.y, -dir.x);
    offset.x /= aspect;
    if side < 0.0 {
        offset = -offset;
    }
    offset * linewidth / resolution.y
}

/// Perpendicular pixel distance between the two sides of a quad built from
/// `screen_offset`.
pub fn pixel_width(start_ndc: Vec2, end_ndc: Vec2, resolution: Vec2, linewidth: f32) -> f32 {
    let to_pixels = |v: Vec2| v * resolution * 0.5;
    let a = to_pixels(screen_offset(start_ndc, end_ndc, resolution, linewidth, 1.0));
    let b = to_pixels(screen_offset(start_ndc, end_ndc, resolution, linewidth, -1.0));
    let dir = to_pixels(end_ndc - start_ndc).normalize_or_zero();
    let across = a - b;
    (across - dir * across.dot(dir)).length()
}

/// Moves a clip-space endpoint behind the near plane onto it, along the
/// segment, as the vertex shader does before the perspective divide.
pub fn trim_to_near_plane(start: Vec4, end: Vec4) -> (Vec4, Vec4) {
    // wgpu clip space keeps 0 <= z <= w.
    let start_out = start.z < 0.0;
    let end_out = end.z < 0.0;
    if start_out == end_out {
        return (start, end);
    }
    let t = start.z / (start.z - end.z);
    let on_plane = start + (end - start) * t;
    if start_out {
        (on_plane, end)
    } else {
        (start, on_plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn horizontal_line_width_matches_thickness() {
        let start = Vec2::new(-0.5, 0.0);
        let end = Vec2::new(0.5, 0.0);
        for resolution in [Vec2::new(800.0, 600.0), Vec2::new(1600.0, 1200.0), Vec2::new(300.0, 900.0)] {
            assert_relative_eq!(pixel_width(start, end, resolution, 3.0), 3.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn diagonal_line_width_matches_thickness() {
        let start = Vec2::new(-0.3, -0.7);
        let end = Vec2::new(0.4, 0.2);
        for resolution in [Vec2::new(1280.0, 720.0), Vec2::new(720.0, 1280.0)] {
            assert_relative_eq!(pixel_width(start, end, resolution, 2.5), 2.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn sides_are_opposite() {
        let res = Vec2::new(640.0, 480.0);
        let a = screen_offset(Vec2::ZERO, Vec2::X, res, 2.0, 1.0);
        let b = screen_offset(Vec2::ZERO, Vec2::X, res, 2.0, -1.0);
        assert_eq!(a, -b);
    }

    #[test]
    fn near_plane_trimming_keeps_visible_end() {
        let start = Vec4::new(0.0, 0.0, -1.0, 1.0);
        let end = Vec4::new(0.0, 0.0, 1.0, 3.0);
        let (a, b) = trim_to_near_plane(start, end);
        assert_relative_eq!(a.z, 0.0);
        assert_eq!(b, end);
    }

    #[test]
    fn uniform_is_32_bytes() {
        assert_eq!(std::mem::size_of::<LineUniform>(), 32);
    }
}
