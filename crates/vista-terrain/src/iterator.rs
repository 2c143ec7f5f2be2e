use glam::{DVec3, Mat4, Vec3};
use vista_geom::{Face, PackedBox, RegionOrigin};

use crate::frustum::TerrainFrustum;
use crate::position::{RegionPosition, ShadowParams};
use crate::region::StoredRegion;
use crate::storage::RegionStorage;
use crate::visibility::{CameraView, ShadowView, ViewKind, Visibility};
use crate::visible_list::{ShadowRegionList, VisibleRegionList};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationState {
    Idle,
    Ready,
    Running,
    Complete,
}

/// Per-frame knobs for the region walk.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationConfig {
    pub render_distance: i32,
    /// When false every region in range is visible and nothing is rasterized.
    pub should_cull: bool,
    pub advanced_culling: bool,
    pub cull_backfacing: bool,
    pub enable_near_occluders: bool,
    pub shadows_enabled: bool,
    pub cascade_radii: [f32; 4],
    pub frustum_padding: f32,
    pub debug_raster: bool,
    pub trace_edge_cases: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            render_distance: 12,
            should_cull: true,
            advanced_culling: false,
            cull_backfacing: true,
            enable_near_occluders: false,
            shadows_enabled: false,
            cascade_radii: [16.0, 48.0, 112.0, 240.0],
            frustum_padding: 0.0,
            debug_raster: false,
            trace_edge_cases: false,
        }
    }
}

impl IterationConfig {
    /// True when switching from `self` to `other` changes which regions a walk accepts.
    fn culling_differs(&self, other: &IterationConfig) -> bool {
        self.render_distance != other.render_distance
            || self.should_cull != other.should_cull
            || self.advanced_culling != other.advanced_culling
            || self.cull_backfacing != other.cull_backfacing
            || self.enable_near_occluders != other.enable_near_occluders
    }
}

/// Walks region storage near to far from the camera, testing each region against the
/// occlusion raster built from the regions before it, then does the same from the light.
pub struct TerrainIterator {
    state: IterationState,
    config: IterationConfig,
    frustum: TerrainFrustum,
    camera: Visibility<CameraView>,
    shadow: Visibility<ShadowView>,
    visible: VisibleRegionList,
    shadow_visible: ShadowRegionList,
    update_regions: Vec<RegionOrigin>,
    camera_redrawn: bool,
}

impl Default for TerrainIterator {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainIterator {
    pub fn new() -> Self {
        Self {
            state: IterationState::Idle,
            config: IterationConfig::default(),
            frustum: TerrainFrustum::new(),
            camera: Visibility::default(),
            shadow: Visibility::default(),
            visible: VisibleRegionList::new(),
            shadow_visible: ShadowRegionList::new(),
            update_regions: Vec::new(),
            camera_redrawn: false,
        }
    }

    /// Feeds this frame's camera and settings. Must precede [`TerrainIterator::run`].
    pub fn prepare(
        &mut self,
        camera_pos: DVec3,
        view_proj: Mat4,
        light_dir: Option<Vec3>,
        config: IterationConfig,
    ) {
        debug_assert!(self.state != IterationState::Running);
        if self.config.culling_differs(&config) {
            self.camera.invalidate();
            self.shadow.invalidate();
        }
        self.frustum.set_padding(config.frustum_padding);
        let change = self.frustum.update(camera_pos, view_proj);
        if change.origin {
            self.camera.invalidate();
        }
        let occluder = self.camera.occluder_mut();
        occluder.set_trace_edge_cases(config.trace_edge_cases);
        occluder.set_view(camera_pos, view_proj);

        let shadow = self.shadow.kind_mut();
        shadow.set_cascade_radii(config.cascade_radii);
        if let Some(dir) = light_dir {
            shadow.set_light_direction(dir);
        }
        self.config = config;
        self.state = IterationState::Ready;
    }

    /// Runs the camera walk, then the shadow walk when shadows are enabled.
    pub fn run<R: StoredRegion>(&mut self, storage: &mut RegionStorage<R>) {
        if self.state != IterationState::Ready {
            log::warn!(target: "terrain", "terrain iteration run in state {:?}", self.state);
            return;
        }
        self.state = IterationState::Running;
        self.visible.clear();
        self.update_regions.clear();

        self.walk_camera(storage);
        if self.config.shadows_enabled {
            self.walk_shadow(storage);
        } else {
            self.shadow_visible.clear();
        }

        if self.config.debug_raster && self.camera_redrawn {
            self.camera.occluder().log_raster("camera");
        }
        log::trace!(
            target: "terrain",
            "walk done: {} visible, {} to rebuild, {} shadow",
            self.visible.len(),
            self.update_regions.len(),
            self.shadow_visible.len()
        );
        self.state = IterationState::Complete;
    }

    /// Marks results consumed; the next frame starts from `Idle`.
    pub fn reset(&mut self) {
        if self.state == IterationState::Complete {
            self.state = IterationState::Idle;
        }
    }

    pub fn invalidate(&mut self) {
        self.camera.invalidate();
        self.shadow.invalidate();
    }

    fn walk_camera<R: StoredRegion>(&mut self, storage: &mut RegionStorage<R>) {
        let redrawn = self.camera.prepare_for_iteration();
        self.camera_redrawn = redrawn;
        let rd = self.config.render_distance;
        if redrawn {
            self.seed_camera(storage, rd);
        }

        let camera_origin = self.frustum.camera_origin();
        let should_cull = self.config.should_cull;
        let near_occluders = self.config.enable_near_occluders;

        while let Some(origin) = self.camera.pvrs_mut().next() {
            let Some(stored) = storage.get_mut(origin) else {
                continue;
            };
            let region = stored.terrain_mut();
            region.position.update_camera(&self.frustum, rd);
            let pos = &region.position;
            if !pos.in_render_distance() || !(pos.is_potentially_visible() || pos.is_near()) {
                continue;
            }
            let near = pos.is_near();
            let from_dist = pos.square_chunk_distance();

            let (visible, fresh) =
                self.camera
                    .test_region(region, should_cull, origin == camera_origin);
            if !visible {
                continue;
            }
            self.visible.add(origin);
            if region.needs_rebuild() {
                self.update_regions.push(origin);
            }
            if fresh
                && should_cull
                && !region.occluders().is_empty()
                && (!near || near_occluders)
            {
                self.camera.occlude_region(region);
            }

            for face in Face::ALL {
                let neighbor = origin.neighbor(face);
                if self.camera.pvrs().contains(neighbor) {
                    continue;
                }
                let Some(stored) = storage.get_mut(neighbor) else {
                    continue;
                };
                let position = &mut stored.terrain_mut().position;
                position.update_camera(&self.frustum, rd);
                if accepts_neighbor(&self.config, position, from_dist, face.opposite()) {
                    let rank = self.camera.kind().rank(position);
                    self.camera.pvrs_mut().add(neighbor, rank);
                }
            }
        }
        self.camera.complete();
    }

    /// Seeds the camera's own region, or the nearest world layer when the camera is above or
    /// below loaded terrain.
    fn seed_camera<R: StoredRegion>(&mut self, storage: &mut RegionStorage<R>, rd: i32) {
        let camera_origin = self.frustum.camera_origin();
        if storage.contains(camera_origin) {
            self.camera.pvrs_mut().add(camera_origin, 0);
            return;
        }
        let (min_y, max_y) = storage.chunk_y_range();
        let layer = camera_origin.chunk_y().clamp(min_y, max_y);
        let mut seeds: Vec<RegionOrigin> = storage
            .iter()
            .map(|(o, _)| *o)
            .filter(|o| o.chunk_y() == layer)
            .collect();
        seeds.sort_unstable_by_key(|o| o.squared_chunk_distance(camera_origin));
        log::trace!(
            target: "terrain",
            "camera outside loaded layers, seeding {} regions at y={}",
            seeds.len(),
            layer
        );
        for origin in seeds {
            let Some(stored) = storage.get_mut(origin) else {
                continue;
            };
            let position = &mut stored.terrain_mut().position;
            position.update_camera(&self.frustum, rd);
            let rank = self.camera.kind().rank(position);
            self.camera.pvrs_mut().add(origin, rank);
        }
    }

    fn walk_shadow<R: StoredRegion>(&mut self, storage: &mut RegionStorage<R>) {
        if self.camera_redrawn {
            self.shadow.invalidate();
        }
        let camera_pos = self.frustum.camera_pos();
        let extent = (self.config.render_distance + 1) as f32 * 16.0;
        let light_vp = self.shadow.kind().light_view_proj(extent);
        self.shadow.occluder_mut().set_view(camera_pos, light_vp);
        self.shadow.kind_mut().target_mut().set_view(camera_pos, light_vp);

        let redrawn = self.shadow.prepare_for_iteration();
        if redrawn {
            self.redraw_shadow_target(storage);
            self.seed_shadow(storage, extent);
        }

        self.shadow_visible.clear();
        while let Some(origin) = self.shadow.pvrs_mut().next() {
            let Some(stored) = storage.get_mut(origin) else {
                continue;
            };
            let region = stored.terrain_mut();
            let Some(cascade) = region.position.shadow_cascade() else {
                continue;
            };
            let (visible, fresh) = self.shadow.test_region(region, true, false);
            if visible {
                self.shadow_visible.add(origin, cascade);
                if fresh {
                    self.shadow.occlude_region(region);
                }
            }
        }
        self.shadow.complete();
    }

    /// Draws the bounds of every camera-visible region into the shadow target raster.
    fn redraw_shadow_target<R: StoredRegion>(&mut self, storage: &RegionStorage<R>) {
        let target = self.shadow.kind_mut().target_mut();
        target.invalidate();
        target.prepare_scene();
        for origin in self.visible.iter() {
            let Some(bounds) = storage.get(origin).and_then(|r| r.terrain().bounds()) else {
                continue;
            };
            target.prepare_region(origin, PackedBox::RANGE_NEAR);
            target.occlude(&[bounds.with_range(PackedBox::RANGE_EXTREME)]);
        }
    }

    fn seed_shadow<R: StoredRegion>(&mut self, storage: &mut RegionStorage<R>, extent: f32) {
        let shadow = self.shadow.kind();
        let params = ShadowParams {
            light_epoch: shadow.light_epoch(),
            origin_epoch: self.frustum.origin_epoch(),
            light_dir: shadow.light_direction(),
            camera_origin: self.frustum.camera_origin(),
            cascade_radii: shadow.cascade_radii(),
            rank_offset: extent * 2.0,
        };
        let mut seeds = Vec::new();
        for (origin, stored) in storage.iter_mut() {
            let region = stored.terrain_mut();
            if !region.has_geometry() {
                continue;
            }
            region.position.update_shadow(&params);
            if region.position.shadow_cascade().is_some() {
                seeds.push((*origin, shadow.rank(&region.position)));
            }
        }
        // storage iteration order is unspecified; keep ties stable across frames
        seeds.sort_unstable_by_key(|&(origin, rank)| (rank, origin));
        for (origin, rank) in seeds {
            self.shadow.pvrs_mut().add(origin, rank);
        }
    }

    #[inline]
    pub fn state(&self) -> IterationState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &IterationConfig {
        &self.config
    }

    #[inline]
    pub fn frustum(&self) -> &TerrainFrustum {
        &self.frustum
    }

    #[inline]
    pub fn camera(&self) -> &Visibility<CameraView> {
        &self.camera
    }

    #[inline]
    pub fn shadow(&self) -> &Visibility<ShadowView> {
        &self.shadow
    }

    /// True when the last camera walk cleared and redrew the raster.
    #[inline]
    pub fn camera_redrawn(&self) -> bool {
        self.camera_redrawn
    }

    #[inline]
    pub fn visible(&self) -> &VisibleRegionList {
        &self.visible
    }

    #[inline]
    pub fn shadow_visible(&self) -> &ShadowRegionList {
        &self.shadow_visible
    }

    /// Visible regions whose mesh is missing or stale, near to far.
    #[inline]
    pub fn update_regions(&self) -> &[RegionOrigin] {
        &self.update_regions
    }

    pub fn take_update_regions(&mut self) -> Vec<RegionOrigin> {
        std::mem::take(&mut self.update_regions)
    }
}

/// Whether a walk reaching `position` through `entry_face` from a region at `from_dist`
/// should enqueue it.
fn accepts_neighbor(
    config: &IterationConfig,
    position: &RegionPosition,
    from_dist: i32,
    entry_face: Face,
) -> bool {
    if !position.in_render_distance() {
        return false;
    }
    if position.is_near() {
        return true;
    }
    if position.square_chunk_distance() < from_dist {
        return false;
    }
    if config.advanced_culling {
        position.is_potentially_visible()
    } else {
        !config.cull_backfacing || position.visible_faces().contains(entry_face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::TerrainRegion;

    fn forward() -> Mat4 {
        Mat4::perspective_rh_gl(90f32.to_radians(), 2.0, 0.1, 1000.0)
            * Mat4::look_to_rh(Vec3::ZERO, Vec3::Z, Vec3::Y)
    }

    fn config() -> IterationConfig {
        IterationConfig {
            render_distance: 3,
            ..IterationConfig::default()
        }
    }

    #[test]
    fn run_requires_prepare() {
        let mut storage: RegionStorage<TerrainRegion> = RegionStorage::new(2, 0, 0);
        let mut it = TerrainIterator::new();
        it.run(&mut storage);
        assert_eq!(it.state(), IterationState::Idle);
    }

    #[test]
    fn camera_region_is_always_visible() {
        let mut storage: RegionStorage<TerrainRegion> = RegionStorage::new(3, 0, 0);
        storage.update_camera(RegionOrigin::from_chunk(0, 0, 0));
        let mut it = TerrainIterator::new();
        it.prepare(DVec3::new(8.0, 8.0, 8.0), forward(), None, config());
        it.run(&mut storage);
        assert_eq!(it.state(), IterationState::Complete);
        assert_eq!(it.visible().get(0), Some(RegionOrigin::from_chunk(0, 0, 0)));
        // nothing has been built yet, so everything visible wants a rebuild
        assert_eq!(it.update_regions().len(), it.visible().len());
    }

    #[test]
    fn legacy_rule_rejects_back_entry() {
        let cfg = config();
        let mut storage: RegionStorage<TerrainRegion> = RegionStorage::new(3, 0, 0);
        storage.update_camera(RegionOrigin::from_chunk(0, 0, 0));
        let mut frustum = TerrainFrustum::new();
        frustum.update(DVec3::new(8.0, 8.0, 8.0), forward());
        let mut position = RegionPosition::new(RegionOrigin::from_chunk(0, 0, 3));
        position.update_camera(&frustum, cfg.render_distance);
        // camera is at lower z, so the region shows its north face
        assert!(accepts_neighbor(&cfg, &position, 4, Face::North));
        assert!(!accepts_neighbor(&cfg, &position, 4, Face::South));
        let advanced = IterationConfig {
            advanced_culling: true,
            ..cfg.clone()
        };
        assert!(accepts_neighbor(&advanced, &position, 4, Face::South));
        let no_backface = IterationConfig {
            cull_backfacing: false,
            ..cfg
        };
        assert!(accepts_neighbor(&no_backface, &position, 4, Face::South));
        assert!(!accepts_neighbor(&no_backface, &position, 10, Face::North));
    }
}
