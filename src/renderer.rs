use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::{DVec3, Mat4, Vec3};
use vista_cluster::{
    BufferSynchronizer, ClusterDrawList, DirectBufferAllocator, DrawableHandle, Gfx, GfxError,
    SlabAllocator, VertexCluster, VertexClusterRealm,
};
use vista_geom::epoch::domain::Sort;
use vista_geom::{Epoch, RegionOrigin};
use vista_raster::OccluderStats;
use vista_runtime::{
    BuildBufferPool, EnqueueOutcome, PRIVILEGED_PRIORITY, ProtoRegionSlot, RegionBuildJob,
    RegionBuildOutput, RegionMesher, SharedTerrainExecutor, TaskError, run_region_build,
};
use vista_terrain::{
    IterationState, RegionStorage, ShadowRegionList, StoredRegion, TerrainIterator, TerrainRegion,
    VisibleRegionList,
};

use crate::config::RenderConfig;
use crate::errors::ErrorReporter;

pub const SHADOW_CASCADES: usize = 4;

/// Camera travel in blocks that triggers a translucent resort.
const RESORT_DISTANCE: f64 = 1.0;
const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// What the host hands over each frame. `view_proj` is camera-relative (camera at the origin).
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub position: DVec3,
    pub view_proj: Mat4,
    pub light_dir: Option<Vec3>,
}

/// A region as the renderer keeps it: visibility state, build slot and GPU drawables.
pub struct RenderRegion {
    terrain: TerrainRegion,
    slot: Arc<ProtoRegionSlot>,
    solid: Option<DrawableHandle>,
    translucent: Option<DrawableHandle>,
    // host copy kept for resorts
    translucent_vertices: Vec<u8>,
    // ticket of the build currently uploaded
    shown_ticket: u64,
}

impl RenderRegion {
    #[inline]
    pub fn solid_handle(&self) -> Option<DrawableHandle> {
        self.solid
    }

    #[inline]
    pub fn translucent_handle(&self) -> Option<DrawableHandle> {
        self.translucent
    }

    pub fn has_drawables(&self) -> bool {
        self.solid.is_some() || self.translucent.is_some()
    }

    #[inline]
    pub fn translucent_vertices(&self) -> &[u8] {
        &self.translucent_vertices
    }
}

impl StoredRegion for RenderRegion {
    fn create(origin: RegionOrigin) -> Self {
        Self {
            terrain: TerrainRegion::new(origin),
            slot: Arc::new(ProtoRegionSlot::new()),
            solid: None,
            translucent: None,
            translucent_vertices: Vec::new(),
            shown_ticket: 0,
        }
    }

    fn terrain(&self) -> &TerrainRegion {
        &self.terrain
    }

    fn terrain_mut(&mut self) -> &mut TerrainRegion {
        &mut self.terrain
    }

    fn close(&mut self) {
        self.slot.invalidate();
        self.terrain.close();
    }
}

/// Per-worker context; each worker holds its own result sender.
struct BuildWorker {
    mesher: Arc<dyn RegionMesher>,
    pool: Arc<BuildBufferPool>,
    results: Sender<RegionBuildOutput>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub uploaded: usize,
    pub scheduled_builds: usize,
    pub scheduled_resorts: usize,
    pub visible: usize,
    pub draw_calls: usize,
}

/// Terrain half of a frame: region lifetime, visibility, background builds and batched draws.
pub struct WorldRenderer<G: Gfx> {
    gfx: G,
    config: RenderConfig,
    pending_config: Option<RenderConfig>,
    storage: RegionStorage<RenderRegion>,
    iterator: TerrainIterator,
    visible: VisibleRegionList,
    shadow_visible: ShadowRegionList,
    executor: SharedTerrainExecutor<BuildWorker>,
    results_rx: Receiver<RegionBuildOutput>,
    slabs: SlabAllocator,
    solid: VertexCluster,
    translucent: VertexCluster,
    solid_list: ClusterDrawList,
    translucent_list: ClusterDrawList,
    shadow_lists: [ClusterDrawList; SHADOW_CASCADES],
    sync: BufferSynchronizer,
    direct: DirectBufferAllocator,
    errors: ErrorReporter,
    next_ticket: u64,
    sort_epoch: Epoch<Sort>,
    last_sort_pos: Option<DVec3>,
    frame_index: u64,
    stats: FrameStats,
    last_summary: Instant,
    shut_down: bool,
}

fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .saturating_sub(1)
        .max(4)
}

fn camera_relative(position: DVec3, origin: RegionOrigin) -> [f32; 3] {
    let o = DVec3::new(
        f64::from(origin.x()),
        f64::from(origin.y()),
        f64::from(origin.z()),
    );
    (position - o).as_vec3().to_array()
}

/// Swaps a region's drawable for freshly uploaded vertices. Empty input leaves no drawable.
fn replace_drawable(
    gfx: &mut impl Gfx,
    cluster: &mut VertexCluster,
    slabs: &mut SlabAllocator,
    sync: &mut BufferSynchronizer,
    slot: &mut Option<DrawableHandle>,
    origin: RegionOrigin,
    vertices: &[u8],
) -> Result<(), GfxError> {
    if let Some(old) = slot.take() {
        cluster.release(old, slabs, sync);
    }
    if !vertices.is_empty() {
        *slot = Some(cluster.upload(gfx, slabs, origin, vertices)?);
    }
    Ok(())
}

fn refill(list: &mut ClusterDrawList, handles: Vec<DrawableHandle>) {
    if list.regions() != handles.as_slice() {
        list.clear();
        for handle in handles {
            list.add(handle);
        }
    }
}

impl<G: Gfx> WorldRenderer<G> {
    pub fn new(
        gfx: G,
        config: RenderConfig,
        mesher: Arc<dyn RegionMesher>,
    ) -> Result<Self, TaskError> {
        Self::with_workers(gfx, config, mesher, default_worker_count())
    }

    pub fn with_workers(
        gfx: G,
        config: RenderConfig,
        mesher: Arc<dyn RegionMesher>,
        worker_count: usize,
    ) -> Result<Self, TaskError> {
        let (results_tx, results_rx) = unbounded();
        let pool = BuildBufferPool::with_capacity_from_workers(worker_count);
        let executor = SharedTerrainExecutor::with_workers(worker_count, move |_| BuildWorker {
            mesher: Arc::clone(&mesher),
            pool: Arc::clone(&pool),
            results: results_tx.clone(),
        })?;
        let (min_y, max_y) = config.chunk_y_range();
        log::info!(
            target: "terrain",
            "world renderer: render distance {}, layers {}..={}",
            config.render_distance,
            min_y,
            max_y
        );
        Ok(Self {
            gfx,
            storage: RegionStorage::new(config.render_distance, min_y, max_y),
            errors: ErrorReporter::new(config.concise_errors),
            config,
            pending_config: None,
            iterator: TerrainIterator::new(),
            visible: VisibleRegionList::new(),
            shadow_visible: ShadowRegionList::new(),
            executor,
            results_rx,
            slabs: SlabAllocator::new(),
            solid: VertexCluster::new(VertexClusterRealm::Solid),
            translucent: VertexCluster::new(VertexClusterRealm::Translucent),
            solid_list: ClusterDrawList::new(VertexClusterRealm::Solid),
            translucent_list: ClusterDrawList::new(VertexClusterRealm::Translucent),
            shadow_lists: std::array::from_fn(|_| ClusterDrawList::new(VertexClusterRealm::Solid)),
            sync: BufferSynchronizer::new(),
            direct: DirectBufferAllocator::new(),
            next_ticket: 0,
            sort_epoch: Epoch::INITIAL,
            last_sort_pos: None,
            frame_index: 0,
            stats: FrameStats::default(),
            last_summary: Instant::now(),
            shut_down: false,
        })
    }

    /// Takes effect at the start of the next [`WorldRenderer::setup_terrain`].
    pub fn apply_config(&mut self, config: RenderConfig) {
        self.pending_config = Some(config);
    }

    fn apply_pending_config(&mut self, config: RenderConfig) {
        if config == self.config {
            return;
        }
        self.errors.set_concise(config.concise_errors);
        if config.chunk_y_range() != self.config.chunk_y_range() {
            let (min_y, max_y) = config.chunk_y_range();
            for region in self.storage.close_all() {
                self.release_drawables(region);
            }
            self.storage = RegionStorage::new(config.render_distance, min_y, max_y);
        } else {
            self.storage.set_render_distance(config.render_distance);
        }
        log::debug!(target: "terrain", "render config applied at frame {}", self.frame_index);
        self.config = config;
        self.iterator.invalidate();
    }

    /// Prepares everything the draw passes need for this frame.
    ///
    /// Applies finished builds, keeps region storage centred on the camera, walks visibility,
    /// refreshes the draw lists and queues rebuilds and resorts for visible regions.
    pub fn setup_terrain(&mut self, camera: &CameraState, frame_index: u64, should_cull: bool) {
        if self.shut_down {
            return;
        }
        self.frame_index = frame_index;
        if let Some(config) = self.pending_config.take() {
            self.apply_pending_config(config);
        }
        let mut stats = FrameStats {
            uploaded: self.drain_results(),
            ..FrameStats::default()
        };

        let p = camera.position;
        let camera_origin = RegionOrigin::containing_point(p.x as f32, p.y as f32, p.z as f32);
        let update = self.storage.update_camera(camera_origin);
        if !update.created.is_empty() || !update.closed.is_empty() {
            self.iterator.invalidate();
        }
        for region in update.closed {
            self.release_drawables(region);
        }

        self.iterator.prepare(
            camera.position,
            camera.view_proj,
            camera.light_dir,
            self.config.iteration(should_cull),
        );
        self.iterator.run(&mut self.storage);
        if self.iterator.state() != IterationState::Complete {
            log::warn!(target: "terrain", "frame {}: terrain iteration incomplete", frame_index);
            return;
        }
        self.visible.copy_from(self.iterator.visible());
        self.shadow_visible.copy_from(self.iterator.shadow_visible());
        self.refresh_draw_lists();

        stats.scheduled_builds = self.schedule_rebuilds(camera.position, camera_origin);
        stats.scheduled_resorts = self.schedule_resorts(camera.position);
        stats.visible = self.visible.len();
        self.iterator.reset();
        self.stats = stats;
    }

    fn drain_results(&mut self) -> usize {
        let mut applied = 0;
        let mut occlusion_changed = false;
        while let Ok(output) = self.results_rx.try_recv() {
            let built = matches!(output, RegionBuildOutput::Built { .. });
            if self.apply_output(output) {
                applied += 1;
                occlusion_changed |= built;
            }
        }
        if occlusion_changed {
            self.iterator.invalidate();
        }
        applied
    }

    /// Applies one worker result. Returns whether new geometry was uploaded.
    fn apply_output(&mut self, output: RegionBuildOutput) -> bool {
        let origin = output.origin();
        let Some(region) = self.storage.get_mut(origin) else {
            log::trace!(target: "terrain", "dropping result for unloaded {:?}", origin);
            return false;
        };
        if region.terrain.is_closed() {
            return false;
        }
        match output {
            RegionBuildOutput::Built {
                ticket, buffers, ..
            } => {
                let solid = replace_drawable(
                    &mut self.gfx,
                    &mut self.solid,
                    &mut self.slabs,
                    &mut self.sync,
                    &mut region.solid,
                    origin,
                    &buffers.solid,
                );
                let translucent = replace_drawable(
                    &mut self.gfx,
                    &mut self.translucent,
                    &mut self.slabs,
                    &mut self.sync,
                    &mut region.translucent,
                    origin,
                    &buffers.translucent,
                );
                if let Err(err) = solid.and(translucent) {
                    self.errors.report(err.key(), &err);
                    region.terrain.mark_needs_rebuild();
                }
                region.shown_ticket = ticket;
                region.translucent_vertices.clear();
                region
                    .translucent_vertices
                    .extend_from_slice(&buffers.translucent);
                region.terrain.set_occlusion_data(
                    buffers.bounds,
                    buffers.occluders.clone(),
                    !buffers.translucent.is_empty(),
                );
                true
            }
            RegionBuildOutput::Resorted {
                source_ticket,
                translucent,
                ..
            } => {
                if source_ticket != region.shown_ticket {
                    log::trace!(
                        target: "terrain",
                        "dropping resort of build {} for {:?}, showing {}",
                        source_ticket,
                        origin,
                        region.shown_ticket
                    );
                    return false;
                }
                if let Err(err) = replace_drawable(
                    &mut self.gfx,
                    &mut self.translucent,
                    &mut self.slabs,
                    &mut self.sync,
                    &mut region.translucent,
                    origin,
                    &translucent,
                ) {
                    self.errors.report(err.key(), &err);
                    region.terrain.mark_needs_rebuild();
                }
                region.translucent_vertices = translucent;
                true
            }
            RegionBuildOutput::Abandoned { reason, .. } => {
                self.errors.report(reason.key(), &reason);
                region.terrain.mark_needs_rebuild();
                false
            }
        }
    }

    fn release_drawables(&mut self, mut region: RenderRegion) {
        if let Some(handle) = region.solid.take() {
            self.solid.release(handle, &mut self.slabs, &mut self.sync);
        }
        if let Some(handle) = region.translucent.take() {
            self.translucent
                .release(handle, &mut self.slabs, &mut self.sync);
        }
    }

    fn refresh_draw_lists(&mut self) {
        let storage = &self.storage;
        let solid_of = |origin: RegionOrigin| storage.get(origin).and_then(RenderRegion::solid_handle);

        refill(
            &mut self.solid_list,
            self.visible.iter().filter_map(solid_of).collect(),
        );
        // translucent geometry is drawn back to front
        refill(
            &mut self.translucent_list,
            self.visible
                .iter()
                .rev()
                .filter_map(|o| storage.get(o).and_then(RenderRegion::translucent_handle))
                .collect(),
        );
        for (cascade, list) in self.shadow_lists.iter_mut().enumerate() {
            refill(
                list,
                self.shadow_visible
                    .regions_for_cascade(cascade as u8)
                    .filter_map(solid_of)
                    .collect(),
            );
        }
    }

    fn schedule_rebuilds(&mut self, position: DVec3, camera_origin: RegionOrigin) -> usize {
        let mut scheduled = 0;
        for origin in self.iterator.take_update_regions() {
            let Some(region) = self.storage.get_mut(origin) else {
                continue;
            };
            if !region.terrain.needs_rebuild() {
                continue;
            }
            region.terrain.clear_needs_rebuild();
            self.next_ticket += 1;
            if region.slot.enqueue(self.next_ticket) != EnqueueOutcome::Schedule {
                continue;
            }
            let priority = if origin == camera_origin {
                PRIVILEGED_PRIORITY
            } else {
                region.terrain.position.square_chunk_distance()
            };
            let job = RegionBuildJob {
                origin,
                slot: Arc::clone(&region.slot),
                camera: camera_relative(position, origin),
                resort_source: None,
                source_ticket: region.shown_ticket,
            };
            self.executor.execute_render(priority, move |w: &mut BuildWorker| {
                run_region_build(job, w.mesher.as_ref(), &w.pool, &w.results)
            });
            scheduled += 1;
        }
        if scheduled > 0 {
            log::trace!(target: "terrain", "frame {}: queued {} builds", self.frame_index, scheduled);
        }
        scheduled
    }

    fn schedule_resorts(&mut self, position: DVec3) -> usize {
        let moved = self
            .last_sort_pos
            .is_none_or(|last| last.distance(position) >= RESORT_DISTANCE);
        if moved {
            self.sort_epoch.bump();
            self.last_sort_pos = Some(position);
        }

        let executor = &self.executor;
        self.visible.schedule_resort(
            &mut self.storage,
            self.sort_epoch,
            |origin, region: &RenderRegion| {
                if region.translucent_vertices.is_empty() {
                    return true;
                }
                match region.slot.enqueue_resort() {
                    EnqueueOutcome::Schedule => {}
                    EnqueueOutcome::Coalesced => return false,
                    EnqueueOutcome::Closed => return true,
                }
                let job = RegionBuildJob {
                    origin,
                    slot: Arc::clone(&region.slot),
                    camera: camera_relative(position, origin),
                    resort_source: Some(region.translucent_vertices.clone()),
                    source_ticket: region.shown_ticket,
                };
                let priority = region.terrain.position.square_chunk_distance();
                executor.execute_render(priority, move |w: &mut BuildWorker| {
                    run_region_build(job, w.mesher.as_ref(), &w.pool, &w.results)
                });
                true
            },
        )
    }

    /// Opaque pass. Returns the number of multi-draw calls issued.
    pub fn render_solid(&mut self) -> usize {
        let calls = self
            .solid_list
            .draw(&mut self.gfx, &self.solid, &self.direct, &mut self.sync);
        self.stats.draw_calls += calls;
        calls
    }

    pub fn render_translucent(&mut self) -> usize {
        let calls = self.translucent_list.draw(
            &mut self.gfx,
            &self.translucent,
            &self.direct,
            &mut self.sync,
        );
        self.stats.draw_calls += calls;
        calls
    }

    /// Shadow caster pass for one cascade; includes casters of all inner cascades.
    pub fn render_shadow(&mut self, cascade: usize) -> usize {
        let Some(list) = self.shadow_lists.get_mut(cascade) else {
            return 0;
        };
        let calls = list.draw(&mut self.gfx, &self.solid, &self.direct, &mut self.sync);
        self.stats.draw_calls += calls;
        calls
    }

    /// Fences this frame's retired resources and runs the periodic sweeps.
    pub fn end_frame(&mut self) {
        self.sync.check_point(&mut self.gfx);
        self.direct.update();
        if self.last_summary.elapsed() >= SUMMARY_INTERVAL {
            self.errors.flush_summary();
            self.last_summary = Instant::now();
        }
    }

    pub fn debug_text(&self) -> Vec<String> {
        let active = self
            .visible
            .active_count(|o| self.storage.get(o).is_some_and(RenderRegion::has_drawables));
        vec![
            format!(
                "Regions: {} loaded, {} visible, {} active, {} shadow",
                self.storage.len(),
                self.visible.len(),
                active,
                self.shadow_visible.len()
            ),
            self.slabs.debug_summary(),
            self.solid.debug_summary(),
            self.translucent.debug_summary(),
            self.executor.debug_report(),
            self.direct.debug_string(),
        ]
    }

    /// Stops workers and frees every GPU resource. The renderer draws nothing afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.executor.clear();
        self.executor.shutdown();
        while self.results_rx.try_recv().is_ok() {}

        for region in self.storage.close_all() {
            self.release_drawables(region);
        }
        self.solid_list.release(&mut self.sync);
        self.translucent_list.release(&mut self.sync);
        for list in &mut self.shadow_lists {
            list.release(&mut self.sync);
        }
        self.solid.release_all(&mut self.slabs, &mut self.sync);
        self.translucent
            .release_all(&mut self.slabs, &mut self.sync);
        self.sync.shutdown(&mut self.gfx);
        self.errors.flush_summary();
        log::info!(target: "terrain", "world renderer shut down: {}", self.slabs.debug_summary());
    }

    #[inline]
    pub fn gfx(&self) -> &G {
        &self.gfx
    }

    #[inline]
    pub fn gfx_mut(&mut self) -> &mut G {
        &mut self.gfx
    }

    #[inline]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn visible_regions(&self) -> &[RegionOrigin] {
        self.visible.as_slice()
    }

    pub fn shadow_regions(&self) -> &ShadowRegionList {
        &self.shadow_visible
    }

    pub fn region(&self, origin: RegionOrigin) -> Option<&RenderRegion> {
        self.storage.get(origin)
    }

    pub fn loaded_regions(&self) -> usize {
        self.storage.len()
    }

    pub fn slab_allocator(&self) -> &SlabAllocator {
        &self.slabs
    }

    pub fn occlusion_stats(&self) -> OccluderStats {
        self.iterator.camera().occluder().stats()
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }
}

impl<G: Gfx> Drop for WorldRenderer<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
