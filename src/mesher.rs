use glam::Vec3;
use vista_geom::{Face, PackedBox, REGION_SIZE, RegionOrigin};
use vista_runtime::{BuildBuffers, RegionMesher, TaskError};

const S: i32 = REGION_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Block {
    Air,
    Solid,
    Water,
}

/// Read-only block access for meshing. Called concurrently from worker threads.
pub trait BlockSource: Send + Sync {
    fn block(&self, x: i32, y: i32, z: i32) -> Block;
}

/// Rolling terrain with water filling the valleys below `water_level`.
#[derive(Clone, Debug)]
pub struct HeightfieldWorld {
    pub seed: u32,
    pub base_height: i32,
    pub amplitude: f32,
    pub water_level: i32,
}

impl Default for HeightfieldWorld {
    fn default() -> Self {
        Self {
            seed: 1337,
            base_height: 64,
            amplitude: 12.0,
            water_level: 60,
        }
    }
}

impl HeightfieldWorld {
    pub fn height(&self, x: i32, z: i32) -> i32 {
        let phase = (self.seed % 1024) as f32 * 0.173;
        let (fx, fz) = (x as f32, z as f32);
        let h = (fx * 0.045 + phase).sin() * (fz * 0.038 - phase).cos()
            + 0.35 * (fx * 0.11 + fz * 0.07).sin();
        self.base_height + (h * self.amplitude) as i32
    }
}

impl BlockSource for HeightfieldWorld {
    fn block(&self, x: i32, y: i32, z: i32) -> Block {
        let h = self.height(x, z);
        if y < h {
            Block::Solid
        } else if y < self.water_level {
            Block::Water
        } else {
            Block::Air
        }
    }
}

/// Face-culling mesher: one quad per block face that borders a less opaque block, plus
/// coarse occluder boxes for fully solid layers and rows.
pub struct BlockMesher<W> {
    world: W,
}

impl<W: BlockSource> BlockMesher<W> {
    pub fn new(world: W) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &W {
        &self.world
    }
}

struct RegionBlocks {
    blocks: Vec<Block>,
}

impl RegionBlocks {
    // one block of padding on every side for neighbour lookups
    const DIM: i32 = S + 2;

    fn load(world: &impl BlockSource, origin: RegionOrigin) -> Self {
        let dim = Self::DIM;
        let mut blocks = Vec::with_capacity((dim * dim * dim) as usize);
        for y in -1..=S {
            for z in -1..=S {
                for x in -1..=S {
                    blocks.push(world.block(origin.x() + x, origin.y() + y, origin.z() + z));
                }
            }
        }
        Self { blocks }
    }

    #[inline]
    fn get(&self, x: i32, y: i32, z: i32) -> Block {
        let d = Self::DIM;
        self.blocks[((y + 1) * d * d + (z + 1) * d + (x + 1)) as usize]
    }
}

fn face_normal(face: Face) -> Vec3 {
    let (x, y, z) = face.offset();
    Vec3::new(x as f32, y as f32, z as f32)
}

/// Corners of the unit face of block `(x, y, z)` in counter-clockwise order seen from outside.
fn face_corners(face: Face, x: f32, y: f32, z: f32) -> [Vec3; 4] {
    let (x1, y1, z1) = (x + 1.0, y + 1.0, z + 1.0);
    let quad = match face {
        Face::Down => [(x, y, z), (x1, y, z), (x1, y, z1), (x, y, z1)],
        Face::Up => [(x, y1, z), (x, y1, z1), (x1, y1, z1), (x1, y1, z)],
        Face::North => [(x, y, z), (x, y1, z), (x1, y1, z), (x1, y, z)],
        Face::South => [(x, y, z1), (x1, y, z1), (x1, y1, z1), (x, y1, z1)],
        Face::West => [(x, y, z), (x, y, z1), (x, y1, z1), (x, y1, z)],
        Face::East => [(x1, y, z), (x1, y1, z), (x1, y1, z1), (x1, y, z1)],
    };
    quad.map(|(a, b, c)| Vec3::new(a, b, c))
}

fn pack_normal(n: Vec3) -> u32 {
    let c = |v: f32| ((v * 127.0) as i8) as u8 as u32;
    c(n.x) | c(n.y) << 8 | c(n.z) << 16
}

/// Appends one quad as four 28-byte vertices: position, RGBA, uv, packed normal.
fn add_quad(out: &mut Vec<u8>, mut corners: [Vec3; 4], n: Vec3, rgba: [u8; 4]) {
    let cross = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
    if cross.dot(n) < 0.0 {
        corners.swap(1, 3);
    }
    const UVS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
    let normal = pack_normal(n);
    for (p, (u, v)) in corners.iter().zip(UVS) {
        for c in [p.x, p.y, p.z] {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out.extend_from_slice(&rgba);
        out.extend_from_slice(&u.to_le_bytes());
        out.extend_from_slice(&v.to_le_bytes());
        out.extend_from_slice(&normal.to_le_bytes());
    }
}

fn shade(face: Face) -> [u8; 4] {
    match face {
        Face::Up => [118, 176, 84, 255],
        Face::Down => [92, 74, 58, 255],
        _ => [134, 104, 78, 255],
    }
}

const WATER: [u8; 4] = [48, 96, 200, 160];

/// Full solid layers merge into slabs drawn at every distance; rows only up close.
fn collect_occluders(blocks: &RegionBlocks, out: &mut Vec<PackedBox>) {
    let solid = |x, y, z| blocks.get(x, y, z) == Block::Solid;
    let mut slab_start: Option<i32> = None;
    for y in 0..=S {
        let full = y < S && (0..S).all(|z| (0..S).all(|x| solid(x, y, z)));
        match (full, slab_start) {
            (true, None) => slab_start = Some(y),
            (false, Some(start)) => {
                out.push(PackedBox::new(
                    0,
                    start as u8,
                    0,
                    S as u8,
                    y as u8,
                    S as u8,
                    PackedBox::RANGE_EXTREME,
                ));
                slab_start = None;
            }
            _ => {}
        }
        if full || y == S {
            continue;
        }
        for z in 0..S {
            if (0..S).all(|x| solid(x, y, z)) {
                out.push(PackedBox::new(
                    0,
                    y as u8,
                    z as u8,
                    S as u8,
                    y as u8 + 1,
                    z as u8 + 1,
                    PackedBox::RANGE_NEAR,
                ));
            }
        }
    }
}

impl<W: BlockSource> RegionMesher for BlockMesher<W> {
    fn build(&self, origin: RegionOrigin, out: &mut BuildBuffers) -> Result<(), TaskError> {
        let blocks = RegionBlocks::load(&self.world, origin);
        let mut bounds: Option<PackedBox> = None;

        for y in 0..S {
            for z in 0..S {
                for x in 0..S {
                    let block = blocks.get(x, y, z);
                    if block == Block::Air {
                        continue;
                    }
                    let cell = PackedBox::new(
                        x as u8,
                        y as u8,
                        z as u8,
                        x as u8 + 1,
                        y as u8 + 1,
                        z as u8 + 1,
                        PackedBox::RANGE_EXTREME,
                    );
                    bounds = Some(bounds.map_or(cell, |b| b.union(cell)));

                    for face in Face::ALL {
                        let (dx, dy, dz) = face.offset();
                        let neighbor = blocks.get(x + dx, y + dy, z + dz);
                        let corners = face_corners(face, x as f32, y as f32, z as f32);
                        match (block, neighbor) {
                            (Block::Solid, Block::Air | Block::Water) => {
                                add_quad(&mut out.solid, corners, face_normal(face), shade(face))
                            }
                            (Block::Water, Block::Air) => {
                                add_quad(&mut out.translucent, corners, face_normal(face), WATER)
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        collect_occluders(&blocks, &mut out.occluders);
        out.bounds = bounds;
        log::trace!(
            target: "terrain",
            "meshed {:?}: {} solid bytes, {} translucent bytes, {} occluders",
            origin,
            out.solid.len(),
            out.translucent.len(),
            out.occluders.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Filled;

    impl BlockSource for Filled {
        fn block(&self, _x: i32, y: i32, _z: i32) -> Block {
            if y < 16 { Block::Solid } else { Block::Air }
        }
    }

    struct Pillar;

    impl BlockSource for Pillar {
        fn block(&self, x: i32, y: i32, z: i32) -> Block {
            if x == 3 && z == 3 && (0..4).contains(&y) {
                Block::Solid
            } else {
                Block::Air
            }
        }
    }

    fn build(world: impl BlockSource, origin: RegionOrigin) -> BuildBuffers {
        let mut out = BuildBuffers::default();
        BlockMesher::new(world).build(origin, &mut out).unwrap();
        out
    }

    #[test]
    fn buried_region_only_meshes_its_top() {
        let out = build(Filled, RegionOrigin::from_chunk(0, 0, 0));
        // 256 top faces, 4 vertices of 28 bytes each
        assert_eq!(out.solid.len(), 256 * 4 * 28);
        assert_eq!(out.occluders, vec![PackedBox::FULL_BOX]);
        assert_eq!(out.bounds, Some(PackedBox::FULL_BOX));
    }

    #[test]
    fn empty_region_has_no_bounds() {
        let out = build(Filled, RegionOrigin::from_chunk(0, 2, 0));
        assert!(out.solid.is_empty());
        assert!(out.occluders.is_empty());
        assert_eq!(out.bounds, None);
    }

    #[test]
    fn pillar_is_meshed_but_does_not_occlude() {
        let out = build(Pillar, RegionOrigin::from_chunk(0, 0, 0));
        // 4 sides × 4 blocks + top + bottom
        assert_eq!(out.solid.len(), 18 * 4 * 28);
        assert!(out.occluders.is_empty());
        let b = out.bounds.unwrap();
        assert_eq!((b.x0(), b.y0(), b.x1(), b.y1()), (3, 0, 4, 4));
    }

    #[test]
    fn water_surface_is_translucent() {
        let world = HeightfieldWorld {
            base_height: 4,
            amplitude: 0.0,
            water_level: 8,
            ..HeightfieldWorld::default()
        };
        let out = build(world, RegionOrigin::from_chunk(0, 0, 0));
        assert_eq!(out.translucent.len(), 256 * 4 * 28);
        assert!(!out.occluders.is_empty());
    }
}
