//! Clip-space polygon clipping against the near plane and the guard band.

use glam::Vec4;

use crate::constants::{GUARD_SIZE, NEAR_CLIP_W, PRECISE_HEIGHT, PRECISE_WIDTH};

/// Clipped polygons stay slightly inside the guard band so rounding never re-triggers clipping.
const GUARD_SHRINK: f32 = 0.98;

fn guard_extent_x() -> f32 {
    1.0 + 2.0 * GUARD_SIZE as f32 / PRECISE_WIDTH as f32 * GUARD_SHRINK
}

fn guard_extent_y() -> f32 {
    1.0 + 2.0 * GUARD_SIZE as f32 / PRECISE_HEIGHT as f32 * GUARD_SHRINK
}

#[derive(Clone, Copy)]
enum Plane {
    Near,
    Left,
    Right,
    Bottom,
    Top,
}

const PLANES: [Plane; 5] = [Plane::Near, Plane::Left, Plane::Right, Plane::Bottom, Plane::Top];

#[inline]
fn distance(plane: Plane, v: Vec4, gx: f32, gy: f32) -> f32 {
    match plane {
        Plane::Near => v.w - NEAR_CLIP_W,
        Plane::Left => gx * v.w + v.x,
        Plane::Right => gx * v.w - v.x,
        Plane::Bottom => gy * v.w + v.y,
        Plane::Top => gy * v.w - v.y,
    }
}

/// Reusable scratch for Sutherland–Hodgman clipping.
#[derive(Default)]
pub(crate) struct Clipper {
    a: Vec<Vec4>,
    b: Vec<Vec4>,
}

impl Clipper {
    /// Clips the triangle and returns the resulting convex polygon (empty when fully clipped).
    pub(crate) fn clip_triangle(&mut self, v0: Vec4, v1: Vec4, v2: Vec4) -> &[Vec4] {
        let gx = guard_extent_x();
        let gy = guard_extent_y();
        self.a.clear();
        self.a.extend_from_slice(&[v0, v1, v2]);
        for plane in PLANES {
            self.b.clear();
            let n = self.a.len();
            for i in 0..n {
                let cur = self.a[i];
                let next = self.a[(i + 1) % n];
                let dc = distance(plane, cur, gx, gy);
                let dn = distance(plane, next, gx, gy);
                if dc >= 0.0 {
                    self.b.push(cur);
                }
                if (dc >= 0.0) != (dn >= 0.0) {
                    let t = dc / (dc - dn);
                    self.b.push(cur + (next - cur) * t);
                }
            }
            core::mem::swap(&mut self.a, &mut self.b);
            if self.a.len() < 3 {
                self.a.clear();
                break;
            }
        }
        &self.a
    }
}
