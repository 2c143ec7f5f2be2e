//! Fixed-point triangle setup and per-row boundary events.
//!
//! Coverage is sampled at pixel centres. A pixel belongs to a counter-clockwise triangle when
//! its centre lies inside all three half-planes, with the tie rule: a centre exactly on a
//! left edge (edge heading down) or on a bottom flat edge is inside, a centre exactly on a
//! right edge or top flat edge is outside. Two triangles sharing an edge traverse it in
//! opposite directions, so a tie pixel lands in exactly one of them.

use crate::constants::{
    EVENT_COUNT, GUARD_MAX_X, GUARD_MAX_Y, GUARD_MIN_X, GUARD_MIN_Y, MAX_PIXEL_X, MAX_PIXEL_Y,
    PIXEL_WIDTH, PRECISE_HEIGHT, PRECISE_PIXEL_CENTER, PRECISE_PIXEL_SIZE, PRECISE_WIDTH,
    PRECISION_BITS,
};

/// Screen-space vertex in 1/16-pixel units, y pointing up the raster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProjectedVertex {
    pub px: i32,
    pub py: i32,
}

impl ProjectedVertex {
    #[inline]
    pub const fn new(px: i32, py: i32) -> Self {
        Self { px, py }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsResult {
    /// Back-facing, degenerate, off-viewport, or covering no pixel centre.
    OutsideOrTooSmall,
    /// Extends past the guard band; clip before rasterizing.
    NeedsClip,
    In,
}

const EDGE_LEFT: u8 = 0;
const EDGE_RIGHT: u8 = 1;
const EDGE_FLAT: u8 = 2;

const fn event_key(e0: u8, e1: u8, e2: u8) -> u8 {
    e0 | e1 << 2 | e2 << 4
}

const EVENT_012_LLR: u8 = event_key(EDGE_LEFT, EDGE_LEFT, EDGE_RIGHT);
const EVENT_012_LRL: u8 = event_key(EDGE_LEFT, EDGE_RIGHT, EDGE_LEFT);
const EVENT_012_RLL: u8 = event_key(EDGE_RIGHT, EDGE_LEFT, EDGE_LEFT);
const EVENT_012_LRR: u8 = event_key(EDGE_LEFT, EDGE_RIGHT, EDGE_RIGHT);
const EVENT_012_RLR: u8 = event_key(EDGE_RIGHT, EDGE_LEFT, EDGE_RIGHT);
const EVENT_012_RRL: u8 = event_key(EDGE_RIGHT, EDGE_RIGHT, EDGE_LEFT);
const EVENT_012_LRF: u8 = event_key(EDGE_LEFT, EDGE_RIGHT, EDGE_FLAT);
const EVENT_012_RLF: u8 = event_key(EDGE_RIGHT, EDGE_LEFT, EDGE_FLAT);
const EVENT_012_LFR: u8 = event_key(EDGE_LEFT, EDGE_FLAT, EDGE_RIGHT);
const EVENT_012_RFL: u8 = event_key(EDGE_RIGHT, EDGE_FLAT, EDGE_LEFT);
const EVENT_012_FLR: u8 = event_key(EDGE_FLAT, EDGE_LEFT, EDGE_RIGHT);
const EVENT_012_FRL: u8 = event_key(EDGE_FLAT, EDGE_RIGHT, EDGE_LEFT);

#[inline]
fn edge_role(dy: i32) -> u8 {
    if dy < 0 {
        EDGE_LEFT
    } else if dy > 0 {
        EDGE_RIGHT
    } else {
        EDGE_FLAT
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Edge {
    ax: i32,
    ay: i32,
    dx: i32,
    dy: i32,
}

/// Integer DDA for the column where an edge crosses successive pixel-row centres.
///
/// Tracks `(x_edge - 8) / 16` as `q + r / d` with `0 <= r < d`, so each row is a constant
/// quotient step plus a carry.
struct EdgeStepper {
    q: i64,
    r: i64,
    d: i64,
    step_q: i64,
    step_r: i64,
}

impl EdgeStepper {
    fn new(edge: Edge, first_row: i32) -> Self {
        debug_assert!(edge.dy != 0);
        let (abs_dy, signed_dx) = if edge.dy > 0 {
            (i64::from(edge.dy), i64::from(edge.dx))
        } else {
            (-i64::from(edge.dy), -i64::from(edge.dx))
        };
        let d = abs_dy * i64::from(PRECISE_PIXEL_SIZE);
        let row_center = i64::from((first_row << PRECISION_BITS) + PRECISE_PIXEL_CENTER);
        let n = i64::from(edge.ax - PRECISE_PIXEL_CENTER) * abs_dy
            + signed_dx * (row_center - i64::from(edge.ay));
        let inc = signed_dx * i64::from(PRECISE_PIXEL_SIZE);
        Self {
            q: n.div_euclid(d),
            r: n.rem_euclid(d),
            d,
            step_q: inc.div_euclid(d),
            step_r: inc.rem_euclid(d),
        }
    }

    /// First pixel column whose centre is at or right of the edge.
    #[inline]
    fn ceil(&self) -> i64 {
        self.q + i64::from(self.r != 0)
    }

    #[inline]
    fn step(&mut self) {
        self.q += self.step_q;
        self.r += self.step_r;
        if self.r >= self.d {
            self.r -= self.d;
            self.q += 1;
        }
    }
}

/// Per-thread rasterization state: projected vertices, the prepared triangle and row events.
pub struct RasterContext {
    vertices: Vec<ProjectedVertex>,
    events: Box<[i32]>,
    edges: [Edge; 3],
    min_pixel_x: i32,
    min_pixel_y: i32,
    max_pixel_x: i32,
    max_pixel_y: i32,
}

impl Default for RasterContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterContext {
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(64),
            events: vec![0; EVENT_COUNT].into_boxed_slice(),
            edges: [Edge::default(); 3],
            min_pixel_x: 0,
            min_pixel_y: 0,
            max_pixel_x: -1,
            max_pixel_y: -1,
        }
    }

    #[inline]
    pub fn clear_vertices(&mut self) {
        self.vertices.clear();
    }

    #[inline]
    pub fn push_vertex(&mut self, v: ProjectedVertex) -> usize {
        self.vertices.push(v);
        self.vertices.len() - 1
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> ProjectedVertex {
        self.vertices[index]
    }

    /// Inclusive pixel bounds `(min_x, min_y, max_x, max_y)` of the prepared triangle.
    #[inline]
    pub fn pixel_bounds(&self) -> (i32, i32, i32, i32) {
        (
            self.min_pixel_x,
            self.min_pixel_y,
            self.max_pixel_x,
            self.max_pixel_y,
        )
    }

    /// Covered column span of a scanned row, `None` when the row is empty.
    #[inline]
    pub fn row_span(&self, py: i32) -> Option<(i32, i32)> {
        if py < self.min_pixel_y || py > self.max_pixel_y {
            return None;
        }
        let i = (py as usize) << 1;
        let (left, right) = (self.events[i], self.events[i + 1]);
        (left <= right).then_some((left, right))
    }

    /// Classifies the triangle `v0, v1, v2` (indices into the vertex buffer).
    ///
    /// Only `In` updates the prepared-triangle state; the other results leave it untouched.
    pub fn prepare_bounds(&mut self, v0: usize, v1: usize, v2: usize) -> BoundsResult {
        let a = self.vertices[v0];
        let b = self.vertices[v1];
        let c = self.vertices[v2];

        let min_x = a.px.min(b.px).min(c.px);
        let max_x = a.px.max(b.px).max(c.px);
        let min_y = a.py.min(b.py).min(c.py);
        let max_y = a.py.max(b.py).max(c.py);

        if max_y <= 0 || min_y >= PRECISE_HEIGHT || max_x <= 0 || min_x >= PRECISE_WIDTH {
            return BoundsResult::OutsideOrTooSmall;
        }

        if min_x < GUARD_MIN_X || max_x > GUARD_MAX_X || min_y < GUARD_MIN_Y || max_y > GUARD_MAX_Y
        {
            return BoundsResult::NeedsClip;
        }

        let cross = i64::from(b.px - a.px) * i64::from(c.py - a.py)
            - i64::from(c.px - a.px) * i64::from(b.py - a.py);
        if cross <= 0 {
            return BoundsResult::OutsideOrTooSmall;
        }

        let min_pixel_x = ((min_x + PRECISE_PIXEL_CENTER - 1) >> PRECISION_BITS).max(0);
        let max_pixel_x = ((max_x - PRECISE_PIXEL_CENTER) >> PRECISION_BITS).min(MAX_PIXEL_X);
        let min_pixel_y = ((min_y + PRECISE_PIXEL_CENTER - 1) >> PRECISION_BITS).max(0);
        let max_pixel_y = ((max_y - PRECISE_PIXEL_CENTER) >> PRECISION_BITS).min(MAX_PIXEL_Y);

        if min_pixel_x > max_pixel_x || min_pixel_y > max_pixel_y {
            return BoundsResult::OutsideOrTooSmall;
        }

        self.min_pixel_x = min_pixel_x;
        self.max_pixel_x = max_pixel_x;
        self.min_pixel_y = min_pixel_y;
        self.max_pixel_y = max_pixel_y;
        self.edges = [
            Edge {
                ax: a.px,
                ay: a.py,
                dx: b.px - a.px,
                dy: b.py - a.py,
            },
            Edge {
                ax: b.px,
                ay: b.py,
                dx: c.px - b.px,
                dy: c.py - b.py,
            },
            Edge {
                ax: c.px,
                ay: c.py,
                dx: a.px - c.px,
                dy: a.py - c.py,
            },
        ];
        BoundsResult::In
    }

    /// Fills left/right events for every row of the triangle prepared by `prepare_bounds`.
    pub fn prepare_scan(&mut self) {
        let [e0, e1, e2] = self.edges;
        let key = event_key(edge_role(e0.dy), edge_role(e1.dy), edge_role(e2.dy));
        match key {
            EVENT_012_LRF => {
                self.populate_left_events(e0);
                self.populate_right_events(e1);
                self.populate_flat_events(e2);
            }
            EVENT_012_RLF => {
                self.populate_left_events(e1);
                self.populate_right_events(e0);
                self.populate_flat_events(e2);
            }
            EVENT_012_LFR => {
                self.populate_left_events(e0);
                self.populate_right_events(e2);
                self.populate_flat_events(e1);
            }
            EVENT_012_RFL => {
                self.populate_left_events(e2);
                self.populate_right_events(e0);
                self.populate_flat_events(e1);
            }
            EVENT_012_FLR => {
                self.populate_left_events(e1);
                self.populate_right_events(e2);
                self.populate_flat_events(e0);
            }
            EVENT_012_FRL => {
                self.populate_left_events(e2);
                self.populate_right_events(e1);
                self.populate_flat_events(e0);
            }
            EVENT_012_LLR => {
                self.populate_left_events2(e0, e1);
                self.populate_right_events(e2);
            }
            EVENT_012_LRL => {
                self.populate_left_events2(e0, e2);
                self.populate_right_events(e1);
            }
            EVENT_012_RLL => {
                self.populate_left_events2(e1, e2);
                self.populate_right_events(e0);
            }
            EVENT_012_LRR => {
                self.populate_left_events(e0);
                self.populate_right_events2(e1, e2);
            }
            EVENT_012_RLR => {
                self.populate_left_events(e1);
                self.populate_right_events2(e0, e2);
            }
            EVENT_012_RRL => {
                self.populate_left_events(e2);
                self.populate_right_events2(e0, e1);
            }
            // Unreachable for a triangle that passed the winding test.
            _ => self.clear_events(),
        }
    }

    fn clear_events(&mut self) {
        for py in self.min_pixel_y..=self.max_pixel_y {
            let i = (py as usize) << 1;
            self.events[i] = PIXEL_WIDTH;
            self.events[i + 1] = -1;
        }
    }

    #[inline]
    fn clamp_left(&self, ceil: i64) -> i32 {
        ceil.clamp(i64::from(self.min_pixel_x), i64::from(PIXEL_WIDTH)) as i32
    }

    #[inline]
    fn clamp_right(&self, ceil: i64) -> i32 {
        (ceil - 1).clamp(-1, i64::from(self.max_pixel_x)) as i32
    }

    fn populate_left_events(&mut self, edge: Edge) {
        let mut s = EdgeStepper::new(edge, self.min_pixel_y);
        for py in self.min_pixel_y..=self.max_pixel_y {
            self.events[(py as usize) << 1] = self.clamp_left(s.ceil());
            s.step();
        }
    }

    /// Two left edges: the boundary is the larger of the two at every row.
    fn populate_left_events2(&mut self, edge_a: Edge, edge_b: Edge) {
        let mut a = EdgeStepper::new(edge_a, self.min_pixel_y);
        let mut b = EdgeStepper::new(edge_b, self.min_pixel_y);
        for py in self.min_pixel_y..=self.max_pixel_y {
            self.events[(py as usize) << 1] = self.clamp_left(a.ceil().max(b.ceil()));
            a.step();
            b.step();
        }
    }

    fn populate_right_events(&mut self, edge: Edge) {
        let mut s = EdgeStepper::new(edge, self.min_pixel_y);
        for py in self.min_pixel_y..=self.max_pixel_y {
            self.events[((py as usize) << 1) + 1] = self.clamp_right(s.ceil());
            s.step();
        }
    }

    /// Two right edges: the boundary is the smaller of the two at every row.
    fn populate_right_events2(&mut self, edge_a: Edge, edge_b: Edge) {
        let mut a = EdgeStepper::new(edge_a, self.min_pixel_y);
        let mut b = EdgeStepper::new(edge_b, self.min_pixel_y);
        for py in self.min_pixel_y..=self.max_pixel_y {
            self.events[((py as usize) << 1) + 1] = self.clamp_right(a.ceil().min(b.ceil()));
            a.step();
            b.step();
        }
    }

    /// A bottom edge (heading +x) keeps rows whose centre is at or above it; a top edge
    /// (heading -x) keeps rows strictly below it.
    fn populate_flat_events(&mut self, edge: Edge) {
        for py in self.min_pixel_y..=self.max_pixel_y {
            let center = (py << PRECISION_BITS) + PRECISE_PIXEL_CENTER;
            let excluded = if edge.dx > 0 {
                center < edge.ay
            } else {
                center >= edge.ay
            };
            if excluded {
                let i = (py as usize) << 1;
                self.events[i] = PIXEL_WIDTH;
                self.events[i + 1] = -1;
            }
        }
    }
}
