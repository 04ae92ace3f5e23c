//! Wanted-set construction
//!
//! Every tick the streamer wants the square neighborhood of chunks around
//! the viewpoint, ordered so that near, ahead-of-camera, in-frustum chunks
//! fetch first. Frustum and facing only *reprioritize*; they never drop a
//! chunk from the set, so looking around does not refetch.

use std::collections::HashSet;

use crate::core::camera::CameraPose;
use crate::core::types::{Mat4, Vec3};
use crate::math::Frustum;
use crate::world::grid::{ChunkGrid, ChunkKey};

/// Fixed transform between the world's data space and the viewer's space
#[derive(Clone, Copy, Debug)]
pub struct ModelTransform {
    pub to_view: Mat4,
    pub from_view: Mat4,
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self {
            to_view: Mat4::IDENTITY,
            from_view: Mat4::IDENTITY,
        }
    }
}

impl ModelTransform {
    pub fn new(to_view: Mat4) -> Self {
        Self {
            to_view,
            from_view: to_view.inverse(),
        }
    }
}

/// The ordered wanted keys for one tick, plus the in-frustum subset
#[derive(Clone, Debug, Default)]
pub struct WantSet {
    /// Keys in fetch order (best first)
    pub order: Vec<ChunkKey>,
    /// Keys whose AABB intersected the frustum (all keys when culling is off)
    pub in_frustum: HashSet<ChunkKey>,
}

// Priority penalties. A chunk behind the camera scores 1.6x worse, one
// outside the frustum 1.9x worse; both combine multiplicatively.
const BEHIND_PENALTY: f32 = 1.6;
const OUT_OF_FRUSTUM_PENALTY: f32 = 1.9;

/// Build the wanted set for a camera pose
///
/// The center is the override point (data space) when given, otherwise the
/// camera position mapped into data space. Keys are scored by squared
/// distance times the facing and frustum penalties, ascending; ties keep
/// enumeration order.
pub fn build_want_set(
    camera: &CameraPose,
    grid: &ChunkGrid,
    model: &ModelTransform,
    radius: i32,
    frustum_culling: bool,
    override_center: Option<Vec3>,
) -> WantSet {
    let center = override_center.unwrap_or_else(|| model.from_view.transform_point3(camera.position));
    let center_key = grid.key_of(center);
    let forward = model
        .from_view
        .transform_vector3(camera.forward)
        .normalize_or_zero();

    let frustum = if frustum_culling {
        Some(Frustum::from_clip_matrix(&(camera.view_proj * model.to_view)))
    } else {
        None
    };

    let side = (2 * radius + 1).max(1) as usize;
    let mut scored: Vec<(f32, ChunkKey)> = Vec::with_capacity(side * side);
    let mut in_frustum = HashSet::with_capacity(side * side);

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let key = ChunkKey::new(center_key.sx + dx, center_key.sy + dy);
            let chunk_center = grid.center_of(key);

            let visible = match &frustum {
                Some(f) => {
                    let aabb = grid.aabb_of(key);
                    // A degenerate box cannot be classified; keep it visible
                    !aabb.is_finite() || f.intersects_aabb(&aabb)
                }
                None => true,
            };
            if visible {
                in_frustum.insert(key);
            }

            let mut score = chunk_center.distance_squared(center);
            if forward != Vec3::ZERO && (chunk_center - center).dot(forward) < 0.0 {
                score *= BEHIND_PENALTY;
            }
            if !visible {
                score *= OUT_OF_FRUSTUM_PENALTY;
            }
            scored.push((score, key));
        }
    }

    // Stable sort: equal scores keep enumeration order
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    WantSet {
        order: scored.into_iter().map(|(_, key)| key).collect(),
        in_frustum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(100.0, -50.0, 50.0)
    }

    fn pose_at(position: Vec3, forward: Vec3) -> CameraPose {
        let view = Mat4::look_at_rh(position, position + forward, Vec3::Z);
        let proj = Mat4::perspective_rh(60.0_f32.to_radians(), 1.0, 0.1, 10_000.0);
        CameraPose::new(position, forward, proj * view)
    }

    #[test]
    fn test_radius_zero_wants_exactly_the_center_chunk() {
        let camera = pose_at(Vec3::new(10.0, 10.0, 10.0), Vec3::Y);
        let want = build_want_set(&camera, &grid(), &ModelTransform::default(), 0, true, None);
        assert_eq!(want.order, vec![ChunkKey::new(0, 0)]);
    }

    #[test]
    fn test_neighborhood_size_and_center_first() {
        let camera = pose_at(Vec3::new(50.0, 50.0, 0.0), Vec3::Y);
        let want = build_want_set(&camera, &grid(), &ModelTransform::default(), 2, false, None);
        assert_eq!(want.order.len(), 25);
        assert_eq!(want.order[0], ChunkKey::new(0, 0));
        // Without culling everything counts as in frustum
        assert_eq!(want.in_frustum.len(), 25);
    }

    #[test]
    fn test_behind_camera_sorts_after_ahead() {
        // Camera at the center of chunk (0,0), facing +Y
        let camera = pose_at(Vec3::new(50.0, 50.0, 0.0), Vec3::Y);
        let want = build_want_set(&camera, &grid(), &ModelTransform::default(), 1, false, None);

        let rank = |key: ChunkKey| want.order.iter().position(|k| *k == key).unwrap();
        assert!(rank(ChunkKey::new(0, 1)) < rank(ChunkKey::new(0, -1)));
        assert!(rank(ChunkKey::new(1, 1)) < rank(ChunkKey::new(1, -1)));
    }

    #[test]
    fn test_frustum_reprioritizes_but_never_excludes() {
        let camera = pose_at(Vec3::new(50.0, 50.0, 0.0), Vec3::Y);
        let want = build_want_set(&camera, &grid(), &ModelTransform::default(), 1, true, None);

        // All 9 keys stay wanted
        assert_eq!(want.order.len(), 9);

        let ahead = ChunkKey::new(0, 1);
        let behind = ChunkKey::new(0, -1);
        assert!(want.in_frustum.contains(&ahead));
        assert!(!want.in_frustum.contains(&behind));

        // Equidistant: ahead scores d^2, behind d^2 * 1.6 * 1.9
        let rank = |key: ChunkKey| want.order.iter().position(|k| *k == key).unwrap();
        assert!(rank(ahead) < rank(behind));
    }

    #[test]
    fn test_override_center_wins_over_camera() {
        let camera = pose_at(Vec3::new(50.0, 50.0, 0.0), Vec3::Y);
        let want = build_want_set(
            &camera,
            &grid(),
            &ModelTransform::default(),
            0,
            false,
            Some(Vec3::new(950.0, 50.0, 0.0)),
        );
        assert_eq!(want.order, vec![ChunkKey::new(9, 0)]);
    }

    #[test]
    fn test_model_transform_maps_viewer_to_data_space() {
        // Data space is shifted 1000 units along x in viewer space
        let model = ModelTransform::new(Mat4::from_translation(Vec3::new(1000.0, 0.0, 0.0)));
        let camera = pose_at(Vec3::new(1050.0, 50.0, 0.0), Vec3::Y);
        let want = build_want_set(&camera, &grid(), &model, 0, false, None);
        assert_eq!(want.order, vec![ChunkKey::new(0, 0)]);
    }
}
