use crate::constants::{
    MAX_PIXEL_X, MAX_PIXEL_Y, TILE_AXIS_SHIFT, TILE_COUNT, TILE_PIXEL_INDEX_MASK, TILE_WIDTH,
};
use crate::triangle::RasterContext;

/// Coverage bitmap stored as one 64-bit word per 8×8 tile; bit `row << 3 | col`.
pub struct TileRaster {
    tiles: Box<[u64]>,
}

impl Default for TileRaster {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn tile_index(tile_x: i32, tile_y: i32) -> usize {
    (tile_y * TILE_WIDTH + tile_x) as usize
}

/// Bits for columns `lo..=hi` (tile-local) of one tile row.
#[inline]
fn row_mask(lo: i32, hi: i32) -> u64 {
    let width = (hi - lo + 1) as u32;
    let bits = if width >= 8 { 0xFF } else { (1u64 << width) - 1 };
    bits << lo
}

impl TileRaster {
    pub fn new() -> Self {
        Self {
            tiles: vec![0; TILE_COUNT].into_boxed_slice(),
        }
    }

    pub fn clear(&mut self) {
        self.tiles.fill(0);
    }

    #[inline]
    pub fn tile_word(&self, tile_x: i32, tile_y: i32) -> u64 {
        self.tiles[tile_index(tile_x, tile_y)]
    }

    pub fn is_pixel_set(&self, x: i32, y: i32) -> bool {
        if !(0..=MAX_PIXEL_X).contains(&x) || !(0..=MAX_PIXEL_Y).contains(&y) {
            return false;
        }
        let word = self.tile_word(x >> TILE_AXIS_SHIFT, y >> TILE_AXIS_SHIFT);
        let bit = ((y & TILE_PIXEL_INDEX_MASK) << TILE_AXIS_SHIFT) | (x & TILE_PIXEL_INDEX_MASK);
        word & (1u64 << bit) != 0
    }

    /// Number of covered pixels.
    pub fn coverage(&self) -> u32 {
        self.tiles.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.iter().all(|&w| w == 0)
    }

    /// ORs the triangle scanned into `ctx` into the raster, one tile word at a time.
    pub fn fill_triangle(&mut self, ctx: &RasterContext) {
        let (min_x, min_y, max_x, max_y) = ctx.pixel_bounds();
        if min_x > max_x || min_y > max_y {
            return;
        }
        for tile_y in (min_y >> TILE_AXIS_SHIFT)..=(max_y >> TILE_AXIS_SHIFT) {
            let row_base = tile_y << TILE_AXIS_SHIFT;
            for tile_x in (min_x >> TILE_AXIS_SHIFT)..=(max_x >> TILE_AXIS_SHIFT) {
                let col_base = tile_x << TILE_AXIS_SHIFT;
                let mut word = 0u64;
                for row in 0..=TILE_PIXEL_INDEX_MASK {
                    let Some((left, right)) = ctx.row_span(row_base + row) else {
                        continue;
                    };
                    let lo = left.max(col_base) - col_base;
                    let hi = right.min(col_base + TILE_PIXEL_INDEX_MASK) - col_base;
                    if lo <= hi {
                        word |= row_mask(lo, hi) << (row << TILE_AXIS_SHIFT);
                    }
                }
                if word != 0 {
                    self.tiles[tile_index(tile_x, tile_y)] |= word;
                }
            }
        }
    }

    /// True when every pixel of the inclusive rectangle is covered.
    pub fn is_rect_occluded(&self, min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> bool {
        self.scan_rect(min_x, min_y, max_x, max_y, |word, mask| word & mask == mask)
    }

    /// True when any pixel of the inclusive rectangle is covered.
    pub fn overlaps_rect(&self, min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> bool {
        !self.scan_rect(min_x, min_y, max_x, max_y, |word, mask| word & mask == 0)
    }

    /// Applies `test` to each tile word under the rectangle with the rectangle's mask for that
    /// tile; returns false at the first tile failing the test.
    fn scan_rect(
        &self,
        min_x: i32,
        min_y: i32,
        max_x: i32,
        max_y: i32,
        test: impl Fn(u64, u64) -> bool,
    ) -> bool {
        let min_x = min_x.max(0);
        let min_y = min_y.max(0);
        let max_x = max_x.min(MAX_PIXEL_X);
        let max_y = max_y.min(MAX_PIXEL_Y);
        if min_x > max_x || min_y > max_y {
            return true;
        }
        for tile_y in (min_y >> TILE_AXIS_SHIFT)..=(max_y >> TILE_AXIS_SHIFT) {
            let row_base = tile_y << TILE_AXIS_SHIFT;
            let row_lo = min_y.max(row_base) - row_base;
            let row_hi = max_y.min(row_base + TILE_PIXEL_INDEX_MASK) - row_base;
            for tile_x in (min_x >> TILE_AXIS_SHIFT)..=(max_x >> TILE_AXIS_SHIFT) {
                let col_base = tile_x << TILE_AXIS_SHIFT;
                let lo = min_x.max(col_base) - col_base;
                let hi = max_x.min(col_base + TILE_PIXEL_INDEX_MASK) - col_base;
                let cols = row_mask(lo, hi);
                let mut mask = 0u64;
                for row in row_lo..=row_hi {
                    mask |= cols << (row << TILE_AXIS_SHIFT);
                }
                if !test(self.tiles[tile_index(tile_x, tile_y)], mask) {
                    return false;
                }
            }
        }
        true
    }

    /// Copy of the tile words, for debug output and tests.
    pub fn snapshot(&self) -> Vec<u64> {
        self.tiles.to_vec()
    }

    /// Coarse text rendering, one character per `step`×`step` pixel block, top row first.
    pub fn render_ascii(&self, step: i32) -> Vec<String> {
        let step = step.max(1);
        let mut lines = Vec::new();
        let mut y = MAX_PIXEL_Y - (MAX_PIXEL_Y % step);
        while y >= 0 {
            let mut line = String::new();
            let mut x = 0;
            while x <= MAX_PIXEL_X {
                let covered = self.overlaps_rect(x, y, x + step - 1, y + step - 1);
                line.push(if covered { '#' } else { '.' });
                x += step;
            }
            lines.push(line);
            y -= step;
        }
        lines
    }
}
