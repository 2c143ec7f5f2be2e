//! Raster dimensions and fixed-point parameters.

pub const TILE_AXIS_SHIFT: i32 = 3;
pub const TILE_AXIS_SIZE: i32 = 1 << TILE_AXIS_SHIFT;
pub const TILE_PIXEL_INDEX_MASK: i32 = TILE_AXIS_SIZE - 1;

pub const PIXEL_WIDTH: i32 = 512;
pub const PIXEL_HEIGHT: i32 = 256;
pub const MAX_PIXEL_X: i32 = PIXEL_WIDTH - 1;
pub const MAX_PIXEL_Y: i32 = PIXEL_HEIGHT - 1;

pub const TILE_WIDTH: i32 = PIXEL_WIDTH >> TILE_AXIS_SHIFT;
pub const TILE_HEIGHT: i32 = PIXEL_HEIGHT >> TILE_AXIS_SHIFT;
pub const TILE_COUNT: usize = (TILE_WIDTH * TILE_HEIGHT) as usize;

/// Sub-pixel bits of projected coordinates (1/16 pixel).
pub const PRECISION_BITS: i32 = 4;
pub const PRECISE_PIXEL_SIZE: i32 = 1 << PRECISION_BITS;
pub const PRECISE_PIXEL_CENTER: i32 = PRECISE_PIXEL_SIZE / 2;
pub const PRECISE_WIDTH: i32 = PIXEL_WIDTH << PRECISION_BITS;
pub const PRECISE_HEIGHT: i32 = PIXEL_HEIGHT << PRECISION_BITS;

/// Guard band beyond the viewport, in pixels, inside which triangles are rasterized unclipped.
pub const GUARD_PIXELS: i32 = 256;
pub const GUARD_SIZE: i32 = GUARD_PIXELS << PRECISION_BITS;
pub const GUARD_MIN_X: i32 = -GUARD_SIZE;
pub const GUARD_MAX_X: i32 = PRECISE_WIDTH + GUARD_SIZE;
pub const GUARD_MIN_Y: i32 = -GUARD_SIZE;
pub const GUARD_MAX_Y: i32 = PRECISE_HEIGHT + GUARD_SIZE;

/// Projected coordinates are saturated here before the guard test so setup math stays in range.
pub const PROJECTION_LIMIT: i32 = 1 << 24;

/// Smallest clip-space w accepted without near-plane clipping.
pub const NEAR_CLIP_W: f32 = 0.05;

/// One left and one right event per pixel row.
pub const EVENT_COUNT: usize = (PIXEL_HEIGHT * 2) as usize;
