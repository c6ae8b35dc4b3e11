use glam::Vec2;
use tracing::trace;

use super::style::{StyleChange, StyleEdit, StyleParams};
use super::variants::Stage;
use crate::renderer::Camera;

pub const RECENTER_MAX_DISTANCE: f32 = 1.0;
pub const RECENTER_MAX_DELTA: f32 = 0.5;
pub const RECENTER_FACTOR: f32 = 3.0;

/// Pushes the orbit target out when the camera has crept up on it, so
/// zooming in does not stall at the pivot.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrbitRecenter {
    previous: Option<f32>,
}

impl OrbitRecenter {
    /// Returns true when the target was moved this frame.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let dir = camera.target - camera.position;
        let distance = dir.length();
        let previous = self.previous.replace(distance);

        let Some(previous) = previous else {
            return false;
        };
        if distance < RECENTER_MAX_DISTANCE && (distance - previous).abs() < RECENTER_MAX_DELTA {
            camera.set_target(camera.position + dir * RECENTER_FACTOR);
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub recentered: bool,
    pub line_art: bool,
    pub style_version: u64,
}

/// Per-frame synchronisation of style, viewport and camera into the stage.
#[derive(Debug, Default)]
pub struct FrameLoop {
    recenter: OrbitRecenter,
    frames: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything that happens before drawing: resolution, visibility,
    /// line style, field of view and recentering, in that order.
    pub fn tick(
        &mut self,
        stage: &mut Stage,
        style: &StyleParams,
        camera: &mut Camera,
        resolution: Vec2,
    ) -> FrameReport {
        self.frames += 1;
        let line_art = style.use_shader();

        if let Some(variants) = stage.variants_mut() {
            for material in variants.line_materials_mut() {
                material.resolution = resolution;
            }

            variants.background.visible = line_art;
            variants.hard_edges.visible = line_art;
            variants.conditional.visible = line_art;
            variants.textured.visible = !line_art;

            let color = style.line_color().to_linear();
            for material in variants.line_materials_mut() {
                material.color = color;
                material.linewidth = style.thickness();
                material.visible = line_art;
            }
        }

        camera.set_fov_degrees(style.fov());
        camera.set_aspect(resolution.x, resolution.y);
        let recentered = self.recenter.update(camera);
        if recentered {
            trace!(frame = self.frames, target = ?camera.target, "recentered orbit target");
        }

        FrameReport {
            recentered,
            line_art,
            style_version: style.version(),
        }
    }

    /// Applies a control-panel edit, then ticks. The materials and camera
    /// handed to the GPU this frame already carry the edit.
    pub fn tick_with_edit(
        &mut self,
        stage: &mut Stage,
        style: &mut StyleParams,
        edit: StyleEdit,
        camera: &mut Camera,
        resolution: Vec2,
    ) -> (StyleChange, FrameReport) {
        let change = style.apply(edit);
        if change.threshold {
            stage.rebuild_hard_edges(style.threshold());
        }
        let report = self.tick(stage, style, camera, resolution);
        (change, report)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn reset_recenter(&mut self) {
        self.recenter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn camera_at(distance: f32) -> Camera {
        let mut camera = Camera::default();
        camera.position = Vec3::new(0.0, 0.0, distance);
        camera.set_target(Vec3::ZERO);
        camera
    }

    #[test]
    fn first_frame_never_moves() {
        let mut recenter = OrbitRecenter::default();
        let mut camera = camera_at(0.5);
        assert!(!recenter.update(&mut camera));
        assert_eq!(camera.target, Vec3::ZERO);
    }

    #[test]
    fn close_and_steady_pushes_target_three_times_out() {
        let mut recenter = OrbitRecenter::default();
        let mut camera = camera_at(0.8);
        recenter.update(&mut camera);

        camera.position = Vec3::new(0.0, 0.0, 0.6);
        assert!(recenter.update(&mut camera));
        assert_relative_eq!(camera.target.z, 0.6 - 1.8, epsilon = 1e-5);
        assert_relative_eq!(camera.distance(), 1.8, epsilon = 1e-5);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 0.6));
    }

    #[test]
    fn steady_close_camera_compares_against_the_measured_distance() {
        let mut recenter = OrbitRecenter::default();
        let mut camera = camera_at(0.1);

        let mut trace = Vec::new();
        for _ in 0..10 {
            trace.push((recenter.update(&mut camera), camera.distance()));
        }
        let moved: Vec<bool> = trace.iter().map(|&(moved, _)| moved).collect();
        assert_eq!(
            moved,
            [false, true, true, false, true, false, false, false, false, false]
        );
        // 0.1 -> 0.3 -> 0.9, a frame where the 0.6 jump blocks it, then 2.7.
        assert_relative_eq!(trace[1].1, 0.3, epsilon = 1e-5);
        assert_relative_eq!(trace[3].1, 0.9, epsilon = 1e-5);
        assert_relative_eq!(trace[9].1, 2.7, epsilon = 1e-4);
    }

    #[test]
    fn far_or_jumping_camera_is_left_alone() {
        let mut recenter = OrbitRecenter::default();
        let mut camera = camera_at(1.0);
        recenter.update(&mut camera);
        assert!(!recenter.update(&mut camera));

        let mut recenter = OrbitRecenter::default();
        let mut camera = camera_at(5.0);
        recenter.update(&mut camera);
        camera.position = Vec3::new(0.0, 0.0, 0.9);
        assert!(!recenter.update(&mut camera));
        assert_eq!(camera.target, Vec3::ZERO);
    }
}
