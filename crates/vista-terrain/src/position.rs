use glam::Vec3;
use vista_geom::epoch::domain::{CameraOrigin, FrustumPosition, FrustumView, Light, Sort};
use vista_geom::{Epoch, FaceFlags, Face, PackedBox, REGION_SIZE, RegionOrigin};

use crate::frustum::TerrainFrustum;

/// Regions within this squared chunk distance of the camera are "near": always traversed and
/// never trusted as occluders unless near occluders are enabled.
pub const NEAR_SQUARE_CHUNK_DISTANCE: i32 = 3;

/// Squared chunk distance from which visibility tests widen by one pixel.
const FUZZ_SQUARE_CHUNK_DISTANCE: i32 = 49;

/// Half the diagonal of a region, in blocks.
const REGION_RADIUS: f32 = REGION_SIZE as f32 * 0.866_025_4;

/// Inputs for the shadow-related cached values.
#[derive(Clone, Copy, Debug)]
pub struct ShadowParams {
    pub light_epoch: Epoch<Light>,
    pub origin_epoch: Epoch<CameraOrigin>,
    /// Direction light travels, normalized.
    pub light_dir: Vec3,
    pub camera_origin: RegionOrigin,
    pub cascade_radii: [f32; 4],
    /// Added to the light-axis distance so ranks stay non-negative.
    pub rank_offset: f32,
}

/// Cached camera-relative facts about one region, recomputed only when the epoch governing
/// each value has moved.
#[derive(Clone, Debug)]
pub struct RegionPosition {
    origin: RegionOrigin,
    square_chunk_distance: i32,
    occlusion_range: u8,
    fuzz: i32,
    visible_faces: FaceFlags,
    in_render_distance: bool,
    is_near: bool,
    potentially_visible: bool,
    shadow_cascade: Option<u8>,
    shadow_distance_rank: usize,
    origin_stamp: Option<(Epoch<CameraOrigin>, i32)>,
    frustum_stamp: Option<(Epoch<FrustumView>, Epoch<FrustumPosition>)>,
    shadow_stamp: Option<(Epoch<Light>, Epoch<CameraOrigin>)>,
    sort_stamp: Option<Epoch<Sort>>,
    recompute_count: u64,
}

impl RegionPosition {
    pub fn new(origin: RegionOrigin) -> Self {
        Self {
            origin,
            square_chunk_distance: i32::MAX,
            occlusion_range: PackedBox::RANGE_EXTREME,
            fuzz: 0,
            visible_faces: FaceFlags::UNASSIGNED,
            in_render_distance: false,
            is_near: false,
            potentially_visible: false,
            shadow_cascade: None,
            shadow_distance_rank: 0,
            origin_stamp: None,
            frustum_stamp: None,
            shadow_stamp: None,
            sort_stamp: None,
            recompute_count: 0,
        }
    }

    #[inline]
    pub fn origin(&self) -> RegionOrigin {
        self.origin
    }

    /// Refreshes camera-derived values whose epochs changed since they were last computed.
    pub fn update_camera(&mut self, frustum: &TerrainFrustum, render_distance: i32) {
        let origin_stamp = (frustum.origin_epoch(), render_distance);
        if self.origin_stamp != Some(origin_stamp) {
            self.compute_origin_values(frustum.camera_origin(), render_distance);
            self.origin_stamp = Some(origin_stamp);
            self.recompute_count += 1;
        }

        let frustum_stamp = (frustum.view_epoch(), frustum.position_epoch());
        if self.frustum_stamp != Some(frustum_stamp) {
            self.potentially_visible = frustum.is_region_visible(self.origin);
            if self.origin == frustum.camera_origin() {
                self.force_camera_potential_visibility();
            }
            self.frustum_stamp = Some(frustum_stamp);
            self.recompute_count += 1;
        }
    }

    fn compute_origin_values(&mut self, camera: RegionOrigin, render_distance: i32) {
        let dist = self.origin.squared_chunk_distance(camera);
        self.square_chunk_distance = dist;
        self.occlusion_range = PackedBox::range_from_square_chunk_dist(dist);
        self.fuzz = i32::from(dist >= FUZZ_SQUARE_CHUNK_DISTANCE);
        self.is_near = dist <= NEAR_SQUARE_CHUNK_DISTANCE;
        self.in_render_distance =
            self.origin.horizontal_chunk_distance_sq(camera) <= render_distance * render_distance;

        let mut faces = FaceFlags::UNASSIGNED;
        let (cx, cy, cz) = (camera.chunk_x(), camera.chunk_y(), camera.chunk_z());
        let (rx, ry, rz) = (self.origin.chunk_x(), self.origin.chunk_y(), self.origin.chunk_z());
        if cx < rx {
            faces.insert(Face::West);
        } else if cx > rx {
            faces.insert(Face::East);
        }
        if cy < ry {
            faces.insert(Face::Down);
        } else if cy > ry {
            faces.insert(Face::Up);
        }
        if cz < rz {
            faces.insert(Face::North);
        } else if cz > rz {
            faces.insert(Face::South);
        }
        self.visible_faces = faces;
    }

    /// Refreshes cascade membership and light-axis rank.
    pub fn update_shadow(&mut self, params: &ShadowParams) {
        let stamp = (params.light_epoch, params.origin_epoch);
        if self.shadow_stamp == Some(stamp) {
            return;
        }
        let [ox, oy, oz] = self.origin.center();
        let [cx, cy, cz] = params.camera_origin.center();
        let rel = Vec3::new(ox - cx, oy - cy, oz - cz);
        let dist = rel.length() - REGION_RADIUS;
        self.shadow_cascade = params
            .cascade_radii
            .iter()
            .position(|&r| dist <= r)
            .map(|i| i as u8);
        let along = rel.dot(params.light_dir) + params.rank_offset;
        self.shadow_distance_rank = (along.max(0.0) / REGION_SIZE as f32) as usize;
        self.shadow_stamp = Some(stamp);
        self.recompute_count += 1;
    }

    #[inline]
    pub fn is_sort_needed(&self, sort_epoch: Epoch<Sort>) -> bool {
        self.sort_stamp != Some(sort_epoch)
    }

    /// True the first time it is called for a given sort epoch.
    pub fn check_and_update_sort_needed(&mut self, sort_epoch: Epoch<Sort>) -> bool {
        if self.sort_stamp == Some(sort_epoch) {
            return false;
        }
        self.sort_stamp = Some(sort_epoch);
        true
    }

    /// The camera's own region can sit behind the near plane yet must always be walked.
    pub fn force_camera_potential_visibility(&mut self) {
        self.potentially_visible = true;
    }

    /// Forgets every cached value; the next update recomputes all of them.
    pub fn close(&mut self) {
        self.origin_stamp = None;
        self.frustum_stamp = None;
        self.shadow_stamp = None;
        self.sort_stamp = None;
        self.in_render_distance = false;
        self.potentially_visible = false;
    }

    #[inline]
    pub fn square_chunk_distance(&self) -> i32 {
        self.square_chunk_distance
    }

    #[inline]
    pub fn occlusion_range(&self) -> u8 {
        self.occlusion_range
    }

    #[inline]
    pub fn fuzz(&self) -> i32 {
        self.fuzz
    }

    #[inline]
    pub fn visible_faces(&self) -> FaceFlags {
        self.visible_faces
    }

    #[inline]
    pub fn in_render_distance(&self) -> bool {
        self.in_render_distance
    }

    #[inline]
    pub fn is_near(&self) -> bool {
        self.is_near
    }

    #[inline]
    pub fn is_potentially_visible(&self) -> bool {
        self.potentially_visible
    }

    #[inline]
    pub fn shadow_cascade(&self) -> Option<u8> {
        self.shadow_cascade
    }

    #[inline]
    pub fn shadow_distance_rank(&self) -> usize {
        self.shadow_distance_rank
    }

    /// Number of cached-value recomputations since creation.
    #[inline]
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }
}

#[cfg(test)]
mod tests {
    use glam::{DVec3, Mat4};

    use super::*;

    fn frustum_at(pos: DVec3) -> TerrainFrustum {
        let mut f = TerrainFrustum::new();
        f.update(
            pos,
            Mat4::perspective_rh_gl(1.5, 2.0, 0.1, 1000.0)
                * Mat4::look_at_rh(glam::Vec3::ZERO, glam::Vec3::Z, glam::Vec3::Y),
        );
        f
    }

    #[test]
    fn distance_derived_values() {
        let f = frustum_at(DVec3::new(8.0, 8.0, 8.0));
        let mut p = RegionPosition::new(RegionOrigin::from_chunk(8, 0, 0));
        p.update_camera(&f, 12);
        assert_eq!(p.square_chunk_distance(), 64);
        assert_eq!(p.occlusion_range(), PackedBox::RANGE_FAR);
        assert_eq!(p.fuzz(), 1);
        assert!(!p.is_near());
        assert!(p.in_render_distance());
        assert!(p.visible_faces().contains(Face::West));
        assert!(!p.visible_faces().contains(Face::East));
        assert!(p.visible_faces().intersects(FaceFlags::UNASSIGNED));
    }

    #[test]
    fn unchanged_epochs_skip_recompute() {
        let mut f = frustum_at(DVec3::new(8.0, 8.0, 8.0));
        let mut p = RegionPosition::new(RegionOrigin::from_chunk(0, 0, 2));
        p.update_camera(&f, 12);
        let n = p.recompute_count();
        p.update_camera(&f, 12);
        assert_eq!(p.recompute_count(), n);

        // Moving within the camera region only touches the frustum-derived value.
        f.update(
            DVec3::new(9.0, 8.0, 8.0),
            Mat4::perspective_rh_gl(1.5, 2.0, 0.1, 1000.0)
                * Mat4::look_at_rh(glam::Vec3::ZERO, glam::Vec3::Z, glam::Vec3::Y),
        );
        p.update_camera(&f, 12);
        assert_eq!(p.recompute_count(), n + 1);
    }

    #[test]
    fn sort_needed_once_per_epoch() {
        let mut p = RegionPosition::new(RegionOrigin::from_chunk(0, 0, 0));
        let mut epoch = Epoch::<Sort>::INITIAL;
        assert!(p.check_and_update_sort_needed(epoch));
        assert!(!p.check_and_update_sort_needed(epoch));
        epoch.bump();
        assert!(p.check_and_update_sort_needed(epoch));
    }
}
