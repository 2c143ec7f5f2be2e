/// Axis-aligned occluder box inside one region, packed into 32 bits.
///
/// Layout (low to high): `x0 y0 z0 x1 y1 z1` at 5 bits each (coordinates 0..=16, max exclusive),
/// then a 2-bit occlusion range. A box takes part in occlusion for a region only when
/// `box.range() >= region_range`, so coarse boxes (high range) are drawn at every distance
/// and fine detail only up close.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedBox(u32);

const COORD_BITS: u32 = 5;
const COORD_MASK: u32 = (1 << COORD_BITS) - 1;
const RANGE_SHIFT: u32 = COORD_BITS * 6;

impl PackedBox {
    pub const RANGE_NEAR: u8 = 0;
    pub const RANGE_MID: u8 = 1;
    pub const RANGE_FAR: u8 = 2;
    pub const RANGE_EXTREME: u8 = 3;

    pub const FULL_BOX: PackedBox = PackedBox::new(0, 0, 0, 16, 16, 16, Self::RANGE_EXTREME);

    #[inline]
    pub const fn new(x0: u8, y0: u8, z0: u8, x1: u8, y1: u8, z1: u8, range: u8) -> Self {
        debug_assert!(x0 <= 16 && y0 <= 16 && z0 <= 16);
        debug_assert!(x1 <= 16 && y1 <= 16 && z1 <= 16);
        debug_assert!(range <= Self::RANGE_EXTREME);
        PackedBox(
            (x0 as u32)
                | (y0 as u32) << COORD_BITS
                | (z0 as u32) << (COORD_BITS * 2)
                | (x1 as u32) << (COORD_BITS * 3)
                | (y1 as u32) << (COORD_BITS * 4)
                | (z1 as u32) << (COORD_BITS * 5)
                | (range as u32 & 3) << RANGE_SHIFT,
        )
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        PackedBox(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    const fn coord(self, slot: u32) -> u8 {
        ((self.0 >> (COORD_BITS * slot)) & COORD_MASK) as u8
    }

    #[inline]
    pub const fn x0(self) -> u8 {
        self.coord(0)
    }

    #[inline]
    pub const fn y0(self) -> u8 {
        self.coord(1)
    }

    #[inline]
    pub const fn z0(self) -> u8 {
        self.coord(2)
    }

    #[inline]
    pub const fn x1(self) -> u8 {
        self.coord(3)
    }

    #[inline]
    pub const fn y1(self) -> u8 {
        self.coord(4)
    }

    #[inline]
    pub const fn z1(self) -> u8 {
        self.coord(5)
    }

    #[inline]
    pub const fn range(self) -> u8 {
        (self.0 >> RANGE_SHIFT) as u8 & 3
    }

    #[inline]
    pub const fn with_range(self, range: u8) -> Self {
        PackedBox((self.0 & !(3 << RANGE_SHIFT)) | (range as u32 & 3) << RANGE_SHIFT)
    }

    /// True when the box has no volume.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.x0() >= self.x1() || self.y0() >= self.y1() || self.z0() >= self.z1()
    }

    #[inline]
    pub fn volume(self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        (self.x1() - self.x0()) as u32 * (self.y1() - self.y0()) as u32 * (self.z1() - self.z0()) as u32
    }

    /// Occlusion range for a region at the given squared chunk distance from the camera.
    #[inline]
    pub const fn range_from_square_chunk_dist(square_chunk_dist: i32) -> u8 {
        if square_chunk_dist < 16 {
            Self::RANGE_NEAR
        } else if square_chunk_dist < 64 {
            Self::RANGE_MID
        } else if square_chunk_dist < 256 {
            Self::RANGE_FAR
        } else {
            Self::RANGE_EXTREME
        }
    }

    /// Smallest box containing both (range taken as the larger of the two).
    pub fn union(self, other: PackedBox) -> PackedBox {
        PackedBox::new(
            self.x0().min(other.x0()),
            self.y0().min(other.y0()),
            self.z0().min(other.z0()),
            self.x1().max(other.x1()),
            self.y1().max(other.y1()),
            self.z1().max(other.z1()),
            self.range().max(other.range()),
        )
    }
}

impl core::fmt::Debug for PackedBox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "PackedBox([{}, {}, {}]..[{}, {}, {}] r{})",
            self.x0(),
            self.y0(),
            self.z0(),
            self.x1(),
            self.y1(),
            self.z1(),
            self.range()
        )
    }
}
