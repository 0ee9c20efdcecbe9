//! Axis conversion between the physics engine (Z-up, quaternions stored
//! `w, x, y, z`) and the renderer (Y-up, quaternions `x, y, z, w`).
//!
//! Every read from and write to a simulation buffer goes through these
//! helpers so both directions use the same permutation.

use glam::{DVec3, Quat, Vec3};

/// Reads element `index` of a 3-wide buffer and converts it to renderer axes.
pub fn position(buffer: &[f64], index: usize) -> Vec3 {
    let base = index * 3;
    Vec3::new(
        buffer[base] as f32,
        buffer[base + 2] as f32,
        -buffer[base + 1] as f32,
    )
}

/// Reads element `index` of a 3-wide buffer without changing axes.
pub fn position_raw(buffer: &[f64], index: usize) -> Vec3 {
    let base = index * 3;
    Vec3::new(
        buffer[base] as f32,
        buffer[base + 1] as f32,
        buffer[base + 2] as f32,
    )
}

/// Reads element `index` of a 4-wide `w, x, y, z` buffer as a renderer rotation.
///
/// The whole quaternion is negated, which describes the same rotation.
pub fn quaternion(buffer: &[f64], index: usize) -> Quat {
    let base = index * 4;
    Quat::from_xyzw(
        -buffer[base + 1] as f32,
        -buffer[base + 3] as f32,
        buffer[base + 2] as f32,
        -buffer[base] as f32,
    )
}

/// Reads element `index` of a 4-wide buffer as `x, y, z, w` without changing axes.
pub fn quaternion_raw(buffer: &[f64], index: usize) -> Quat {
    let base = index * 4;
    Quat::from_xyzw(
        buffer[base] as f32,
        buffer[base + 1] as f32,
        buffer[base + 2] as f32,
        buffer[base + 3] as f32,
    )
}

/// Converts a renderer-space point or vector back to engine axes.
pub fn to_physics_position(v: Vec3) -> DVec3 {
    DVec3::new(v.x as f64, -v.z as f64, v.y as f64)
}

/// Converts a renderer rotation back to an engine `w, x, y, z` quaternion.
pub fn to_physics_quaternion(q: Quat) -> [f64; 4] {
    [-q.w as f64, -q.x as f64, q.z as f64, -q.y as f64]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_round_trips_through_renderer_axes() {
        let buffer = [1.0, 2.0, 3.0];
        let render = position(&buffer, 0);
        assert_eq!(render, Vec3::new(1.0, 3.0, -2.0));
        assert_eq!(to_physics_position(render), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn indexes_into_flat_buffers() {
        let buffer = [0.0, 0.0, 0.0, 4.0, 5.0, 6.0];
        assert_eq!(position(&buffer, 1), Vec3::new(4.0, 6.0, -5.0));
        assert_eq!(position_raw(&buffer, 1), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn quaternion_round_trips() {
        let engine = [0.5, 0.5, -0.5, 0.5];
        let render = quaternion(&engine, 0);
        assert_eq!(to_physics_quaternion(render), engine);
    }

    #[test]
    fn engine_up_maps_to_renderer_up() {
        // 90 degrees about engine Z is 90 degrees about renderer Y.
        let half = std::f64::consts::FRAC_PI_4;
        let engine = [half.cos(), 0.0, 0.0, half.sin()];
        let render = quaternion(&engine, 0);
        let rotated = render * Vec3::X;
        let expected = position(&[0.0, 1.0, 0.0], 0);
        assert!((rotated - expected).length() < 1e-5);
    }
}
