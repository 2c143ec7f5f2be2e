use core::ops::{BitAnd, BitOr, BitOrAssign};

/// One of the six axis-aligned faces of a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Down,
        Face::Up,
        Face::North,
        Face::South,
        Face::West,
        Face::East,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Face::Down => 0,
            Face::Up => 1,
            Face::North => 2,
            Face::South => 3,
            Face::West => 4,
            Face::East => 5,
        }
    }

    #[inline]
    pub const fn opposite(self) -> Face {
        match self {
            Face::Down => Face::Up,
            Face::Up => Face::Down,
            Face::North => Face::South,
            Face::South => Face::North,
            Face::West => Face::East,
            Face::East => Face::West,
        }
    }

    /// Unit step in chunk space. North is -z, West is -x.
    #[inline]
    pub const fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::Down => (0, -1, 0),
            Face::Up => (0, 1, 0),
            Face::North => (0, 0, -1),
            Face::South => (0, 0, 1),
            Face::West => (-1, 0, 0),
            Face::East => (1, 0, 0),
        }
    }

    #[inline]
    pub const fn flag(self) -> FaceFlags {
        FaceFlags(1 << self.index())
    }
}

/// Bit set of faces. Bit 6 marks "unassigned" and is carried by every camera-facing set,
/// so a region entered without a face (the traversal seed) always passes face tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FaceFlags(u8);

impl FaceFlags {
    pub const EMPTY: FaceFlags = FaceFlags(0);
    pub const UNASSIGNED: FaceFlags = FaceFlags(1 << 6);
    pub const ALL: FaceFlags = FaceFlags(0x7F);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x7F)
    }

    #[inline]
    pub const fn contains(self, face: Face) -> bool {
        self.0 & (1 << face.index()) != 0
    }

    #[inline]
    pub const fn intersects(self, other: FaceFlags) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn insert(&mut self, face: Face) {
        self.0 |= 1 << face.index();
    }
}

impl From<Face> for FaceFlags {
    fn from(value: Face) -> Self {
        value.flag()
    }
}

impl BitOr for FaceFlags {
    type Output = FaceFlags;
    #[inline]
    fn bitor(self, rhs: FaceFlags) -> FaceFlags {
        FaceFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FaceFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: FaceFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FaceFlags {
    type Output = FaceFlags;
    #[inline]
    fn bitand(self, rhs: FaceFlags) -> FaceFlags {
        FaceFlags(self.0 & rhs.0)
    }
}
