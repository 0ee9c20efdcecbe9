use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

use crate::raycast::Ray;

pub const DEFAULT_POSITION: Vec3 = Vec3::new(2.0, 1.7, 1.7);
pub const DEFAULT_TARGET: Vec3 = Vec3::new(0.0, 0.7, 0.0);
pub const DEFAULT_FOV_DEGREES: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.001;
pub const FAR_PLANE: f32 = 100.0;

const MIN_DISTANCE: f32 = 0.05;
const MAX_PITCH: f32 = 1.55;

/// Perspective camera orbiting a target point, Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            position: DEFAULT_POSITION,
            target: DEFAULT_TARGET,
            fov_y: DEFAULT_FOV_DEGREES.to_radians(),
        }
    }
}

impl OrbitCamera {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), NEAR_PLANE, FAR_PLANE)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    /// World-space ray through a point in normalized device coordinates
    /// (`x` right, `y` up, both in `[-1, 1]`).
    pub fn ray_from_ndc(&self, ndc: Vec2, aspect: f32) -> Ray {
        let inverse = self.view_proj(aspect).inverse();
        let far = inverse * ndc.extend(1.0).extend(1.0);
        let far = far.xyz() / far.w;
        Ray::new(self.position, far - self.position)
    }

    /// Orbits around the target by yaw (about Y) and pitch angles in radians.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let offset = self.position - self.target;
        let distance = offset.length().max(MIN_DISTANCE);
        let current_yaw = offset.x.atan2(offset.z);
        let current_pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();
        let yaw = current_yaw + yaw;
        let pitch = (current_pitch + pitch).clamp(-MAX_PITCH, MAX_PITCH);
        let offset = Vec3::new(
            pitch.cos() * yaw.sin(),
            pitch.sin(),
            pitch.cos() * yaw.cos(),
        ) * distance;
        self.position = self.target + offset;
    }

    /// Scales the distance to the target; factors below one move closer.
    pub fn zoom(&mut self, factor: f32) {
        let offset = (self.position - self.target) * factor.max(1e-3);
        let distance = offset.length();
        let offset = if distance < MIN_DISTANCE {
            offset.normalize_or_zero() * MIN_DISTANCE
        } else {
            offset
        };
        self.position = self.target + offset;
    }

    /// Slides camera and target in the view plane.
    pub fn pan(&mut self, right: f32, up: f32) {
        let forward = (self.target - self.position).normalize_or_zero();
        let right_axis = forward.cross(Vec3::Y).normalize_or_zero();
        let up_axis = right_axis.cross(forward);
        let delta = right_axis * right + up_axis * up;
        self.position += delta;
        self.target += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_ray_points_at_target() {
        let camera = OrbitCamera::default();
        let ray = camera.ray_from_ndc(Vec2::ZERO, 1.5);
        let expected = (DEFAULT_TARGET - DEFAULT_POSITION).normalize();
        assert!((ray.direction - expected).length() < 1e-3);
        assert_eq!(ray.origin, DEFAULT_POSITION);
    }

    #[test]
    fn rotate_keeps_distance() {
        let mut camera = OrbitCamera::default();
        let before = camera.position.distance(camera.target);
        camera.rotate(0.7, 0.2);
        let after = camera.position.distance(camera.target);
        assert!((before - after).abs() < 1e-4);
        camera.rotate(0.0, 10.0);
        assert!(camera.position.y > camera.target.y);
    }

    #[test]
    fn zoom_and_reset() {
        let mut camera = OrbitCamera::default();
        let before = camera.position.distance(camera.target);
        camera.zoom(0.5);
        assert!((camera.position.distance(camera.target) - before * 0.5).abs() < 1e-4);
        camera.pan(1.0, 0.0);
        camera.reset();
        assert_eq!(camera, OrbitCamera::default());
    }
}
