use glam::{Mat4, Vec2, Vec3};

pub const MAX_DISTANCE: f32 = 200.0;
const MIN_DISTANCE: f32 = 1e-4;
const MAX_PITCH_DEG: f32 = 89.0;

/// Orbit camera circling `target`. The spherical state (yaw, pitch,
/// distance) is kept in sync with `position` so external moves of either
/// the target or the eye are honoured.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub orbital_distance: f32,

    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,

    pub rotate_sensitivity: f32,
    /// Zoom factor per scroll notch.
    pub zoom_step: f32,
    pub max_distance: f32,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            position: Vec3::new(-1.0, 0.5, 2.0) * 0.75,
            target: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            orbital_distance: 1.0,

            fov: 40.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 2000.0,

            rotate_sensitivity: 0.005,
            zoom_step: 0.95,
            max_distance: MAX_DISTANCE,
        };
        camera.sync_spherical();
        camera
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }

    pub fn front(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(Vec3::Y).normalize_or_zero()
    }

    /// Sets the vertical field of view in degrees, clamped to a valid
    /// projection.
    pub fn set_fov_degrees(&mut self, degrees: f32) {
        self.fov = degrees.clamp(1.0, 179.0).to_radians();
    }

    pub fn fov_degrees(&self) -> f32 {
        self.fov.to_degrees()
    }

    /// Drag to orbit; `delta` in pixels.
    pub fn process_mouse_movement(&mut self, delta: Vec2) {
        self.yaw += delta.x * self.rotate_sensitivity;
        self.pitch += delta.y * self.rotate_sensitivity;

        let max_pitch = MAX_PITCH_DEG.to_radians();
        self.pitch = self.pitch.clamp(-max_pitch, max_pitch);
        self.update_orbital_position();
    }

    /// Scroll to dolly; positive `delta` moves closer.
    pub fn process_scroll(&mut self, delta: f32) {
        let factor = self.zoom_step.powf(delta);
        self.orbital_distance =
            (self.orbital_distance * factor).clamp(MIN_DISTANCE, self.max_distance);
        self.update_orbital_position();
    }

    /// Drag to pan; moves eye and target together in the view plane, one
    /// pixel of drag per pixel of screen movement at the target's depth.
    pub fn process_pan(&mut self, delta: Vec2, viewport_height: f32) {
        let world_per_pixel =
            2.0 * self.orbital_distance * (self.fov * 0.5).tan() / viewport_height.max(1.0);
        let right = self.right();
        let up = right.cross(self.front()).normalize_or_zero();
        let shift = (-right * delta.x + up * delta.y) * world_per_pixel;
        self.position += shift;
        self.target += shift;
    }

    /// Moves the orbit target without moving the eye.
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.sync_spherical();
    }

    pub fn reset(&mut self) {
        let aspect = self.aspect;
        let fov = self.fov;
        *self = Self::default();
        self.aspect = aspect;
        self.fov = fov;
    }

    fn sync_spherical(&mut self) {
        let offset = self.position - self.target;
        self.orbital_distance = offset.length().clamp(MIN_DISTANCE, self.max_distance);
        let dir = offset.normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.yaw = dir.z.atan2(dir.x);
        self.pitch = dir.y.clamp(-1.0, 1.0).asin();
    }

    fn update_orbital_position(&mut self) {
        self.position = self.target
            + Vec3::new(
                self.orbital_distance * self.yaw.cos() * self.pitch.cos(),
                self.orbital_distance * self.pitch.sin(),
                self.orbital_distance * self.yaw.sin() * self.pitch.cos(),
            );
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
            camera_pos: camera.position.to_array(),
            _padding: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_view_matches_the_viewer_start() {
        let camera = Camera::default();
        assert_relative_eq!(camera.position.x, -0.75);
        assert_relative_eq!(camera.distance(), camera.orbital_distance, epsilon = 1e-5);
        assert_relative_eq!(camera.fov_degrees(), 40.0, epsilon = 1e-4);
    }

    #[test]
    fn orbiting_keeps_distance() {
        let mut camera = Camera::default();
        let before = camera.distance();
        camera.process_mouse_movement(Vec2::new(120.0, -40.0));
        assert_relative_eq!(camera.distance(), before, epsilon = 1e-5);
    }

    #[test]
    fn zoom_is_clamped_to_max_distance() {
        let mut camera = Camera::default();
        camera.process_scroll(-10_000.0);
        assert_relative_eq!(camera.distance(), MAX_DISTANCE, epsilon = 1e-2);
    }

    #[test]
    fn set_target_keeps_the_eye() {
        let mut camera = Camera::default();
        let eye = camera.position;
        camera.set_target(Vec3::new(0.0, 0.0, -3.0));
        camera.process_mouse_movement(Vec2::ZERO);
        assert_relative_eq!(camera.position.x, eye.x, epsilon = 1e-5);
        assert_relative_eq!(camera.position.y, eye.y, epsilon = 1e-5);
        assert_relative_eq!(camera.position.z, eye.z, epsilon = 1e-5);
    }

    #[test]
    fn fov_is_clamped_for_projection() {
        let mut camera = Camera::default();
        camera.set_fov_degrees(0.0);
        assert_relative_eq!(camera.fov_degrees(), 1.0, epsilon = 1e-4);
        camera.set_fov_degrees(180.0);
        assert_relative_eq!(camera.fov_degrees(), 179.0, epsilon = 1e-3);
    }
}
