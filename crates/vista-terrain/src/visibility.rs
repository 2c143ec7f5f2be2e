use glam::{Mat4, Vec3};
use vista_geom::epoch::domain::{Light, Pvrs, Visibility as VisibilityVersion};
use vista_geom::{Epoch, PackedBox, RegionOrigin};
use vista_raster::Occluder;

use crate::position::RegionPosition;
use crate::pvrs::PotentiallyVisibleRegionSet;
use crate::region::{TerrainRegion, ViewResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityState {
    Stale,
    Iterating,
    Complete,
}

/// What distinguishes one visibility view from another: ordering, test and cached verdict slot.
pub trait ViewKind {
    const LABEL: &'static str;

    fn result_slot(region: &mut TerrainRegion) -> &mut ViewResult;

    /// Traversal rank; lower ranks are processed first.
    fn rank(&self, position: &RegionPosition) -> usize;

    fn fuzz(&self, position: &RegionPosition) -> i32 {
        position.fuzz()
    }

    fn occlusion_range(&self, position: &RegionPosition) -> u8 {
        position.occlusion_range()
    }

    /// Consumes a pending view-specific invalidation.
    fn take_invalidation(&mut self) -> bool {
        false
    }

    fn is_box_visible(
        &mut self,
        occluder: &mut Occluder,
        origin: RegionOrigin,
        range: u8,
        b: PackedBox,
        fuzz: i32,
    ) -> bool {
        occluder.prepare_region(origin, range);
        occluder.is_box_visible(b, fuzz)
    }
}

/// Visibility from the player camera, ranked by squared chunk distance.
#[derive(Default)]
pub struct CameraView;

impl ViewKind for CameraView {
    const LABEL: &'static str = "camera";

    fn result_slot(region: &mut TerrainRegion) -> &mut ViewResult {
        &mut region.camera_result
    }

    fn rank(&self, position: &RegionPosition) -> usize {
        position.square_chunk_distance().max(0) as usize
    }
}

/// Visibility from the sun: regions that can cast a shadow onto camera-visible terrain.
///
/// The target raster holds the camera-visible regions drawn from the light; a region is a
/// caster only when its light-space footprint touches that raster and is not itself hidden
/// behind casters nearer the light.
pub struct ShadowView {
    light_dir: Vec3,
    light_epoch: Epoch<Light>,
    pending_invalidate: bool,
    target: Occluder,
    cascade_radii: [f32; 4],
}

/// Light directions closer than this (component-wise) are treated as unchanged.
const LIGHT_EPSILON: f32 = 1.0e-4;

impl Default for ShadowView {
    fn default() -> Self {
        Self {
            light_dir: Vec3::NEG_Y,
            light_epoch: Epoch::INITIAL,
            pending_invalidate: true,
            target: Occluder::new(),
            cascade_radii: [16.0, 48.0, 112.0, 240.0],
        }
    }
}

impl ShadowView {
    /// Returns true when the direction changed enough to invalidate shadow visibility.
    pub fn set_light_direction(&mut self, dir: Vec3) -> bool {
        let dir = dir.normalize_or_zero();
        if dir == Vec3::ZERO || (dir - self.light_dir).abs().max_element() <= LIGHT_EPSILON {
            return false;
        }
        self.light_dir = dir;
        self.light_epoch.bump();
        self.pending_invalidate = true;
        true
    }

    #[inline]
    pub fn light_direction(&self) -> Vec3 {
        self.light_dir
    }

    #[inline]
    pub fn light_epoch(&self) -> Epoch<Light> {
        self.light_epoch
    }

    pub fn set_cascade_radii(&mut self, radii: [f32; 4]) {
        if radii != self.cascade_radii {
            self.cascade_radii = radii;
            self.light_epoch.bump();
            self.pending_invalidate = true;
        }
    }

    #[inline]
    pub fn cascade_radii(&self) -> [f32; 4] {
        self.cascade_radii
    }

    /// Orthographic light view around the camera, in camera-relative space.
    pub fn light_view_proj(&self, extent: f32) -> Mat4 {
        let up = if self.light_dir.y.abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_to_rh(Vec3::ZERO, self.light_dir, up);
        let proj =
            Mat4::orthographic_rh_gl(-extent, extent, -extent, extent, -2.0 * extent, 2.0 * extent);
        proj * view
    }

    #[inline]
    pub fn target(&self) -> &Occluder {
        &self.target
    }

    #[inline]
    pub fn target_mut(&mut self) -> &mut Occluder {
        &mut self.target
    }
}

impl ViewKind for ShadowView {
    const LABEL: &'static str = "shadow";

    fn result_slot(region: &mut TerrainRegion) -> &mut ViewResult {
        &mut region.shadow_result
    }

    fn rank(&self, position: &RegionPosition) -> usize {
        position.shadow_distance_rank()
    }

    fn fuzz(&self, _position: &RegionPosition) -> i32 {
        0
    }

    fn take_invalidation(&mut self) -> bool {
        std::mem::take(&mut self.pending_invalidate)
    }

    fn is_box_visible(
        &mut self,
        occluder: &mut Occluder,
        origin: RegionOrigin,
        range: u8,
        b: PackedBox,
        fuzz: i32,
    ) -> bool {
        self.target.prepare_region(origin, range);
        if !self.target.overlaps_coverage(b) {
            return false;
        }
        occluder.prepare_region(origin, range);
        occluder.is_box_visible(b, fuzz)
    }
}

/// Occlusion raster, traversal set and version for one view.
///
/// The version increments exactly when the raster is redrawn from scratch; verdicts cached
/// on regions are only trusted for the version they were computed in.
pub struct Visibility<V: ViewKind> {
    kind: V,
    occluder: Occluder,
    pvrs: PotentiallyVisibleRegionSet,
    version: Epoch<VisibilityVersion>,
    pvrs_version_seen: Epoch<Pvrs>,
    invalidate_next: bool,
    state: VisibilityState,
}

impl<V: ViewKind + Default> Default for Visibility<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: ViewKind> Visibility<V> {
    pub fn new(kind: V) -> Self {
        Self {
            kind,
            occluder: Occluder::new(),
            pvrs: PotentiallyVisibleRegionSet::new(),
            version: Epoch::INITIAL,
            pvrs_version_seen: Epoch::INITIAL,
            invalidate_next: true,
            state: VisibilityState::Stale,
        }
    }

    /// Forces a full redraw on the next [`Visibility::prepare_for_iteration`].
    pub fn invalidate(&mut self) {
        self.invalidate_next = true;
        self.state = VisibilityState::Stale;
    }

    /// Starts a pass. Returns true when the raster was cleared and the version advanced;
    /// otherwise the traversal set rewinds and cached verdicts stay valid.
    pub fn prepare_for_iteration(&mut self) -> bool {
        let pvrs_changed = self.pvrs.version() != self.pvrs_version_seen;
        let kind_invalidated = self.kind.take_invalidation();
        if self.invalidate_next || pvrs_changed || kind_invalidated {
            self.occluder.invalidate();
        }
        self.invalidate_next = false;

        let redraw = self.occluder.prepare_scene();
        if redraw {
            self.version.bump();
            self.pvrs.clear();
        } else {
            self.pvrs.return_to_start();
        }
        self.pvrs_version_seen = self.pvrs.version();
        self.state = VisibilityState::Iterating;
        log::trace!(
            target: "terrain",
            "{} visibility pass v{} redraw={}",
            V::LABEL,
            self.version.value(),
            redraw
        );
        redraw
    }

    pub fn complete(&mut self) {
        self.state = VisibilityState::Complete;
    }

    /// Tests a region, reusing its verdict when already computed in this version.
    /// Returns `(visible, fresh)`; `fresh` is false for a reused verdict.
    pub fn test_region(
        &mut self,
        region: &mut TerrainRegion,
        should_cull: bool,
        force_visible: bool,
    ) -> (bool, bool) {
        let version = self.version;
        if let Some((v, visible)) = *V::result_slot(region) {
            if v == version {
                return (visible, false);
            }
        }
        let visible = if force_visible || !should_cull {
            true
        } else {
            let origin = region.origin();
            let fuzz = self.kind.fuzz(&region.position);
            match region.bounds() {
                Some(b) => {
                    let range = self.kind.occlusion_range(&region.position);
                    self.kind
                        .is_box_visible(&mut self.occluder, origin, range, b, fuzz)
                }
                None => self.occluder.is_empty_region_visible(origin, fuzz),
            }
        };
        *V::result_slot(region) = Some((version, visible));
        (visible, true)
    }

    /// Adds the region's occluder boxes to the raster.
    pub fn occlude_region(&mut self, region: &TerrainRegion) {
        let range = self.kind.occlusion_range(&region.position);
        self.occluder.prepare_region(region.origin(), range);
        self.occluder.occlude(region.occluders());
    }

    #[inline]
    pub fn version(&self) -> Epoch<VisibilityVersion> {
        self.version
    }

    #[inline]
    pub fn state(&self) -> VisibilityState {
        self.state
    }

    #[inline]
    pub fn kind(&self) -> &V {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut V {
        &mut self.kind
    }

    #[inline]
    pub fn occluder(&self) -> &Occluder {
        &self.occluder
    }

    #[inline]
    pub fn occluder_mut(&mut self) -> &mut Occluder {
        &mut self.occluder
    }

    #[inline]
    pub fn pvrs(&self) -> &PotentiallyVisibleRegionSet {
        &self.pvrs
    }

    #[inline]
    pub fn pvrs_mut(&mut self) -> &mut PotentiallyVisibleRegionSet {
        &mut self.pvrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_advances_only_on_redraw() {
        let mut vis: Visibility<CameraView> = Visibility::default();
        let v0 = vis.version();
        assert!(vis.prepare_for_iteration());
        assert_eq!(vis.version(), v0.next());
        assert!(!vis.prepare_for_iteration());
        assert_eq!(vis.version(), v0.next());
        vis.invalidate();
        assert_eq!(vis.state(), VisibilityState::Stale);
        assert!(vis.prepare_for_iteration());
        assert_eq!(vis.version(), v0.next().next());
    }

    #[test]
    fn external_pvrs_clear_forces_redraw() {
        let mut vis: Visibility<CameraView> = Visibility::default();
        vis.prepare_for_iteration();
        let v = vis.version();
        vis.pvrs_mut().clear();
        assert!(vis.prepare_for_iteration());
        assert_eq!(vis.version(), v.next());
    }

    #[test]
    fn camera_rank_is_chunk_distance() {
        let mut frustum = crate::frustum::TerrainFrustum::new();
        frustum.update(
            glam::DVec3::new(8.0, 8.0, 8.0),
            Mat4::perspective_rh_gl(1.5, 2.0, 0.1, 1000.0)
                * Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y),
        );
        let mut near = RegionPosition::new(RegionOrigin::from_chunk(1, 0, 0));
        let mut far = RegionPosition::new(RegionOrigin::from_chunk(0, 0, 3));
        near.update_camera(&frustum, 12);
        far.update_camera(&frustum, 12);
        let view = CameraView;
        assert_eq!(view.rank(&near), 1);
        assert_eq!(view.rank(&far), 9);
    }

    #[test]
    fn light_change_invalidates_shadow_view() {
        let mut vis: Visibility<ShadowView> = Visibility::default();
        vis.prepare_for_iteration();
        let v = vis.version();
        assert!(!vis.kind_mut().set_light_direction(Vec3::NEG_Y));
        assert!(!vis.prepare_for_iteration());
        assert!(vis.kind_mut().set_light_direction(Vec3::new(0.3, -1.0, 0.1)));
        assert!(vis.prepare_for_iteration());
        assert_eq!(vis.version(), v.next());
    }
}
