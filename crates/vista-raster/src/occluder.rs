use glam::{DVec3, Mat4, Vec3, Vec4};
use vista_geom::{PackedBox, RegionOrigin};

use crate::clip::Clipper;
use crate::constants::{
    MAX_PIXEL_X, MAX_PIXEL_Y, NEAR_CLIP_W, PRECISE_HEIGHT, PRECISE_WIDTH, PRECISION_BITS,
    PROJECTION_LIMIT,
};
use crate::tile::TileRaster;
use crate::triangle::{BoundsResult, ProjectedVertex, RasterContext};

/// Box corner `i` has x from bit 0, y from bit 1, z from bit 2 (0 = min, 1 = max).
/// Quads are counter-clockwise seen from outside the box.
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 4, 6, 2], // -x
    [1, 3, 7, 5], // +x
    [0, 1, 5, 4], // -y
    [2, 6, 7, 3], // +y
    [0, 2, 3, 1], // -z
    [4, 5, 7, 6], // +z
];

const CORNER_COUNT: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OccluderStats {
    pub boxes_drawn: u64,
    pub boxes_skipped_by_range: u64,
    pub triangles_drawn: u64,
    pub triangles_rejected: u64,
    pub triangles_clipped: u64,
    pub boxes_tested: u64,
    pub boxes_occluded: u64,
    pub scene_clears: u64,
}

#[inline]
fn saturate(v: f32) -> i32 {
    let limit = PROJECTION_LIMIT as f32;
    v.round().clamp(-limit, limit) as i32
}

#[inline]
fn project(clip: Vec4) -> ProjectedVertex {
    let inv_w = 1.0 / clip.w;
    let x = (clip.x * inv_w * 0.5 + 0.5) * PRECISE_WIDTH as f32;
    let y = (clip.y * inv_w * 0.5 + 0.5) * PRECISE_HEIGHT as f32;
    ProjectedVertex::new(saturate(x), saturate(y))
}

/// Occlusion raster plus the view it was drawn from.
///
/// Regions are fed near-to-far: test a region with [`Occluder::is_box_visible`], then add its
/// occluder boxes with [`Occluder::occlude`]. Coverage only accumulates until the next
/// [`Occluder::prepare_scene`] that reports a redraw.
pub struct Occluder {
    ctx: RasterContext,
    raster: TileRaster,
    clipper: Clipper,
    camera_pos: DVec3,
    view_proj: Mat4,
    needs_redraw: bool,
    region_offset: Vec3,
    region_range: u8,
    corners: [Vec4; CORNER_COUNT],
    stats: OccluderStats,
    trace_edge_cases: bool,
}

impl Default for Occluder {
    fn default() -> Self {
        Self::new()
    }
}

impl Occluder {
    pub fn new() -> Self {
        Self {
            ctx: RasterContext::new(),
            raster: TileRaster::new(),
            clipper: Clipper::default(),
            camera_pos: DVec3::ZERO,
            view_proj: Mat4::IDENTITY,
            needs_redraw: true,
            region_offset: Vec3::ZERO,
            region_range: PackedBox::RANGE_NEAR,
            corners: [Vec4::ZERO; CORNER_COUNT],
            stats: OccluderStats::default(),
            trace_edge_cases: false,
        }
    }

    pub fn set_trace_edge_cases(&mut self, enabled: bool) {
        self.trace_edge_cases = enabled;
    }

    /// Updates the view. `view_proj` maps camera-relative world positions to clip space.
    /// Returns true (and schedules a redraw) when anything changed.
    pub fn set_view(&mut self, camera_pos: DVec3, view_proj: Mat4) -> bool {
        let changed = camera_pos != self.camera_pos || view_proj != self.view_proj;
        if changed {
            self.camera_pos = camera_pos;
            self.view_proj = view_proj;
            self.needs_redraw = true;
        }
        changed
    }

    #[inline]
    pub fn camera_pos(&self) -> DVec3 {
        self.camera_pos
    }

    #[inline]
    pub fn view_proj(&self) -> Mat4 {
        self.view_proj
    }

    pub fn invalidate(&mut self) {
        self.needs_redraw = true;
    }

    #[inline]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Clears the raster when a redraw is pending. Returns true when it did.
    pub fn prepare_scene(&mut self) -> bool {
        if !self.needs_redraw {
            return false;
        }
        self.raster.clear();
        self.needs_redraw = false;
        self.stats.scene_clears += 1;
        true
    }

    /// Selects the region subsequent box calls are relative to.
    pub fn prepare_region(&mut self, origin: RegionOrigin, occlusion_range: u8) {
        let rel = DVec3::new(
            f64::from(origin.x()),
            f64::from(origin.y()),
            f64::from(origin.z()),
        ) - self.camera_pos;
        self.region_offset = rel.as_vec3();
        self.region_range = occlusion_range;
    }

    fn compute_corners(&mut self, b: PackedBox) {
        let lo = Vec3::new(f32::from(b.x0()), f32::from(b.y0()), f32::from(b.z0()));
        let hi = Vec3::new(f32::from(b.x1()), f32::from(b.y1()), f32::from(b.z1()));
        for (i, corner) in self.corners.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            );
            *corner = self.view_proj * (self.region_offset + local).extend(1.0);
        }
    }

    /// Draws the region's boxes whose range reaches the current region range.
    pub fn occlude(&mut self, boxes: &[PackedBox]) {
        for &b in boxes {
            if b.range() < self.region_range {
                self.stats.boxes_skipped_by_range += 1;
                continue;
            }
            if b.is_empty() {
                continue;
            }
            self.draw_box(b);
        }
    }

    fn draw_box(&mut self, b: PackedBox) {
        self.compute_corners(b);
        self.ctx.clear_vertices();
        for corner in self.corners {
            self.ctx.push_vertex(project(corner));
        }
        for [q0, q1, q2, q3] in BOX_FACES {
            self.draw_corner_triangle(q0, q1, q2);
            self.draw_corner_triangle(q0, q2, q3);
        }
        self.stats.boxes_drawn += 1;
    }

    fn draw_corner_triangle(&mut self, i0: usize, i1: usize, i2: usize) {
        let near_clipped = self.corners[i0].w < NEAR_CLIP_W
            || self.corners[i1].w < NEAR_CLIP_W
            || self.corners[i2].w < NEAR_CLIP_W;
        if near_clipped {
            self.draw_clipped(i0, i1, i2);
            return;
        }
        match self.ctx.prepare_bounds(i0, i1, i2) {
            BoundsResult::In => self.scan_and_fill(),
            BoundsResult::OutsideOrTooSmall => self.stats.triangles_rejected += 1,
            BoundsResult::NeedsClip => self.draw_clipped(i0, i1, i2),
        }
    }

    fn scan_and_fill(&mut self) {
        self.ctx.prepare_scan();
        self.raster.fill_triangle(&self.ctx);
        self.stats.triangles_drawn += 1;
    }

    fn draw_clipped(&mut self, i0: usize, i1: usize, i2: usize) {
        self.stats.triangles_clipped += 1;
        let polygon = self
            .clipper
            .clip_triangle(self.corners[i0], self.corners[i1], self.corners[i2]);
        if polygon.is_empty() {
            return;
        }
        let base = CORNER_COUNT;
        self.ctx.clear_vertices();
        for corner in self.corners {
            self.ctx.push_vertex(project(corner));
        }
        for &v in polygon {
            self.ctx.push_vertex(project(v));
        }
        let n = polygon.len();
        for k in 1..n - 1 {
            match self.ctx.prepare_bounds(base, base + k, base + k + 1) {
                BoundsResult::In => {
                    self.ctx.prepare_scan();
                    self.raster.fill_triangle(&self.ctx);
                    self.stats.triangles_drawn += 1;
                }
                BoundsResult::OutsideOrTooSmall => self.stats.triangles_rejected += 1,
                BoundsResult::NeedsClip => {
                    self.stats.triangles_rejected += 1;
                    if self.trace_edge_cases {
                        log::trace!(
                            target: "occlusion",
                            "clipped triangle still outside guard band: {:?} {:?} {:?}",
                            self.ctx.vertex(base),
                            self.ctx.vertex(base + k),
                            self.ctx.vertex(base + k + 1)
                        );
                    }
                }
            }
        }
    }

    /// Conservative pixel rectangle of the box's projection, `None` when any corner is at or
    /// behind the near plane.
    fn projected_rect(&mut self, b: PackedBox) -> Option<(i32, i32, i32, i32)> {
        self.compute_corners(b);
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for corner in self.corners {
            if corner.w < NEAR_CLIP_W {
                return None;
            }
            let p = project(corner);
            min_x = min_x.min(p.px);
            max_x = max_x.max(p.px);
            min_y = min_y.min(p.py);
            max_y = max_y.max(p.py);
        }
        Some((
            min_x >> PRECISION_BITS,
            min_y >> PRECISION_BITS,
            max_x >> PRECISION_BITS,
            max_y >> PRECISION_BITS,
        ))
    }

    /// True unless every pixel the box could touch, widened by `fuzz` pixels, is covered.
    /// Boxes entirely off-screen are reported not visible.
    pub fn is_box_visible(&mut self, b: PackedBox, fuzz: i32) -> bool {
        self.stats.boxes_tested += 1;
        let Some((min_x, min_y, max_x, max_y)) = self.projected_rect(b) else {
            return true;
        };
        let (min_x, min_y) = (min_x - fuzz, min_y - fuzz);
        let (max_x, max_y) = (max_x + fuzz, max_y + fuzz);
        if max_x < 0 || min_x > MAX_PIXEL_X || max_y < 0 || min_y > MAX_PIXEL_Y {
            self.stats.boxes_occluded += 1;
            return false;
        }
        let occluded = self.raster.is_rect_occluded(min_x, min_y, max_x, max_y);
        if occluded {
            self.stats.boxes_occluded += 1;
        }
        !occluded
    }

    /// Visibility test for a region with no occluder data of its own.
    pub fn is_empty_region_visible(&mut self, origin: RegionOrigin, fuzz: i32) -> bool {
        self.prepare_region(origin, PackedBox::RANGE_EXTREME);
        self.is_box_visible(PackedBox::FULL_BOX, fuzz)
    }

    /// True when the box's projection touches any covered pixel.
    pub fn overlaps_coverage(&mut self, b: PackedBox) -> bool {
        let Some((min_x, min_y, max_x, max_y)) = self.projected_rect(b) else {
            return true;
        };
        self.raster.overlaps_rect(min_x, min_y, max_x, max_y)
    }

    #[inline]
    pub fn raster(&self) -> &TileRaster {
        &self.raster
    }

    pub fn raster_snapshot(&self) -> Vec<u64> {
        self.raster.snapshot()
    }

    #[inline]
    pub fn stats(&self) -> OccluderStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = OccluderStats::default();
    }

    /// Dumps a coarse picture of the raster at debug level.
    pub fn log_raster(&self, label: &str) {
        if !log::log_enabled!(target: "occlusion", log::Level::Debug) {
            return;
        }
        log::debug!(
            target: "occlusion",
            "{label}: {} pixels covered, {:?}",
            self.raster.coverage(),
            self.stats
        );
        for line in self.raster.render_ascii(8) {
            log::debug!(target: "occlusion", "{line}");
        }
    }
}
