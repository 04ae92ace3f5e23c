//! Camera pose fed into the streamer each tick

use crate::core::types::{Mat4, Vec3};

/// Camera pose in viewer space
///
/// The streamer only needs the position, the forward direction, and the
/// combined view-projection matrix; projection parameters stay with the host.
#[derive(Clone, Copy, Debug)]
pub struct CameraPose {
    /// Position in viewer space
    pub position: Vec3,
    /// Forward direction in viewer space (need not be normalized)
    pub forward: Vec3,
    /// Combined view-projection matrix
    pub view_proj: Mat4,
}

impl CameraPose {
    /// Create a pose from position, forward direction, and view-projection
    pub fn new(position: Vec3, forward: Vec3, view_proj: Mat4) -> Self {
        Self {
            position,
            forward,
            view_proj,
        }
    }

    /// Create a pose looking at a target, with a standard perspective projection
    pub fn look_at(position: Vec3, target: Vec3) -> Self {
        let forward = (target - position).normalize_or_zero();
        let view = Mat4::look_at_rh(position, target, Vec3::Z);
        let proj = Mat4::perspective_rh(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 10_000.0);
        Self {
            position,
            forward,
            view_proj: proj * view,
        }
    }
}
