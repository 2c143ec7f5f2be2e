use serde::{Deserialize, Serialize};

use crate::Face;

pub const REGION_BLOCK_SHIFT: i32 = 4;
/// Edge length of a terrain region in blocks.
pub const REGION_SIZE: i32 = 1 << REGION_BLOCK_SHIFT;

/// Block-space origin of a 16×16×16 terrain region. Components are always multiples of 16.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionOrigin {
    x: i32,
    y: i32,
    z: i32,
}

impl RegionOrigin {
    #[inline]
    pub const fn from_chunk(cx: i32, cy: i32, cz: i32) -> Self {
        Self {
            x: cx << REGION_BLOCK_SHIFT,
            y: cy << REGION_BLOCK_SHIFT,
            z: cz << REGION_BLOCK_SHIFT,
        }
    }

    /// Region containing the given block position.
    #[inline]
    pub const fn containing_block(bx: i32, by: i32, bz: i32) -> Self {
        Self::from_chunk(
            bx >> REGION_BLOCK_SHIFT,
            by >> REGION_BLOCK_SHIFT,
            bz >> REGION_BLOCK_SHIFT,
        )
    }

    /// Region containing a world-space point.
    #[inline]
    pub fn containing_point(x: f32, y: f32, z: f32) -> Self {
        Self::containing_block(x.floor() as i32, y.floor() as i32, z.floor() as i32)
    }

    #[inline]
    pub const fn x(self) -> i32 {
        self.x
    }

    #[inline]
    pub const fn y(self) -> i32 {
        self.y
    }

    #[inline]
    pub const fn z(self) -> i32 {
        self.z
    }

    #[inline]
    pub const fn chunk_x(self) -> i32 {
        self.x >> REGION_BLOCK_SHIFT
    }

    #[inline]
    pub const fn chunk_y(self) -> i32 {
        self.y >> REGION_BLOCK_SHIFT
    }

    #[inline]
    pub const fn chunk_z(self) -> i32 {
        self.z >> REGION_BLOCK_SHIFT
    }

    #[inline]
    pub fn offset_chunks(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::from_chunk(self.chunk_x() + dx, self.chunk_y() + dy, self.chunk_z() + dz)
    }

    #[inline]
    pub fn neighbor(self, face: Face) -> Self {
        let (dx, dy, dz) = face.offset();
        self.offset_chunks(dx, dy, dz)
    }

    /// Squared distance between two regions measured in whole chunks.
    #[inline]
    pub fn squared_chunk_distance(self, other: RegionOrigin) -> i32 {
        let dx = self.chunk_x() - other.chunk_x();
        let dy = self.chunk_y() - other.chunk_y();
        let dz = self.chunk_z() - other.chunk_z();
        dx * dx + dy * dy + dz * dz
    }

    /// Horizontal (x/z only) squared chunk distance, used for render-distance membership.
    #[inline]
    pub fn horizontal_chunk_distance_sq(self, other: RegionOrigin) -> i32 {
        let dx = self.chunk_x() - other.chunk_x();
        let dz = self.chunk_z() - other.chunk_z();
        dx * dx + dz * dz
    }

    /// Centre of the region in world space.
    #[inline]
    pub fn center(self) -> [f32; 3] {
        let half = (REGION_SIZE / 2) as f32;
        [
            self.x as f32 + half,
            self.y as f32 + half,
            self.z as f32 + half,
        ]
    }

    #[inline]
    pub fn contains_block(self, bx: i32, by: i32, bz: i32) -> bool {
        bx >> REGION_BLOCK_SHIFT == self.chunk_x()
            && by >> REGION_BLOCK_SHIFT == self.chunk_y()
            && bz >> REGION_BLOCK_SHIFT == self.chunk_z()
    }
}

impl From<(i32, i32, i32)> for RegionOrigin {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::containing_block(value.0, value.1, value.2)
    }
}

impl From<RegionOrigin> for (i32, i32, i32) {
    fn from(value: RegionOrigin) -> Self {
        (value.x, value.y, value.z)
    }
}
