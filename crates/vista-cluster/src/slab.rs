use crate::error::GfxError;
use crate::gfx::{BufferId, Gfx};

/// Vertex stride of the terrain format.
pub const BYTES_PER_SLAB_VERTEX: usize = 28;
/// Slab capacities are multiples of this many vertices.
pub const SLAB_QUAD_VERTEX_COUNT_INCREMENT: u32 = 0x1000;
pub const SLAB_BYTES_INCREMENT: usize =
    SLAB_QUAD_VERTEX_COUNT_INCREMENT as usize * BYTES_PER_SLAB_VERTEX;
pub const QUAD_VERTEX_COUNT: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlabId(pub u32);

/// Fixed-capacity vertex buffer shared by many regions. Never resized.
///
/// Free space is kept as sorted, coalesced `(start, len)` vertex ranges; every range
/// starts and ends on a quad boundary.
#[derive(Debug)]
pub struct Slab {
    id: SlabId,
    buffer: BufferId,
    capacity_vertices: u32,
    used_vertices: u32,
    free: Vec<(u32, u32)>,
}

impl Slab {
    fn new(id: SlabId, buffer: BufferId, capacity_vertices: u32) -> Self {
        Self {
            id,
            buffer,
            capacity_vertices,
            used_vertices: 0,
            free: vec![(0, capacity_vertices)],
        }
    }

    #[inline]
    pub fn id(&self) -> SlabId {
        self.id
    }

    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[inline]
    pub fn capacity_vertices(&self) -> u32 {
        self.capacity_vertices
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_vertices as usize * BYTES_PER_SLAB_VERTEX
    }

    #[inline]
    pub fn used_vertex_count(&self) -> u32 {
        self.used_vertices
    }

    #[inline]
    pub fn free_vertex_count(&self) -> u32 {
        self.capacity_vertices - self.used_vertices
    }

    /// Takes up to `max_vertices` from the first free range. Returns `(base, count)`.
    pub fn allocate(&mut self, max_vertices: u32) -> Option<(u32, u32)> {
        debug_assert!(max_vertices % QUAD_VERTEX_COUNT == 0);
        if max_vertices == 0 {
            return None;
        }
        let first = self.free.first_mut()?;
        let base = first.0;
        let count = first.1.min(max_vertices);
        first.0 += count;
        first.1 -= count;
        if first.1 == 0 {
            self.free.remove(0);
        }
        self.used_vertices += count;
        Some((base, count))
    }

    /// Returns a range previously handed out by [`Slab::allocate`].
    pub fn free(&mut self, base: u32, count: u32) {
        debug_assert!(count <= self.used_vertices);
        self.used_vertices -= count;
        let at = self.free.partition_point(|&(start, _)| start < base);
        self.free.insert(at, (base, count));
        if at + 1 < self.free.len() {
            let (start, len) = self.free[at];
            if start + len == self.free[at + 1].0 {
                self.free[at].1 += self.free[at + 1].1;
                self.free.remove(at + 1);
            }
        }
        if at > 0 {
            let (start, len) = self.free[at - 1];
            if start + len == self.free[at].0 {
                self.free[at - 1].1 += self.free[at].1;
                self.free.remove(at);
            }
        }
    }
}

/// Creates slabs and keeps aggregate slab statistics.
#[derive(Debug, Default)]
pub struct SlabAllocator {
    next_id: u32,
    slab_count: usize,
    capacity_bytes: usize,
    used_bytes: usize,
}

impl SlabAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slab of at least `min_capacity_bytes`, rounded up to the slab increment.
    pub fn claim(
        &mut self,
        gfx: &mut impl Gfx,
        min_capacity_bytes: usize,
    ) -> Result<Slab, GfxError> {
        let increments = min_capacity_bytes.max(1).div_ceil(SLAB_BYTES_INCREMENT);
        let capacity_bytes = increments * SLAB_BYTES_INCREMENT;
        let buffer = gfx.create_vertex_buffer(capacity_bytes)?;
        self.next_id += 1;
        self.slab_count += 1;
        self.capacity_bytes += capacity_bytes;
        let capacity_vertices = (capacity_bytes / BYTES_PER_SLAB_VERTEX) as u32;
        log::debug!(
            target: "cluster",
            "slab {} claimed: {} vertices in {:?}",
            self.next_id,
            capacity_vertices,
            buffer
        );
        Ok(Slab::new(SlabId(self.next_id), buffer, capacity_vertices))
    }

    pub(crate) fn add_to_vertex_count(&mut self, vertices: u32) {
        self.used_bytes += vertices as usize * BYTES_PER_SLAB_VERTEX;
    }

    pub(crate) fn remove_from_vertex_count(&mut self, vertices: u32) {
        self.used_bytes -= vertices as usize * BYTES_PER_SLAB_VERTEX;
    }

    /// Removes an empty slab from the totals. The slab must have no used vertices.
    pub fn notify_shutdown(&mut self, slab: &Slab) {
        assert_eq!(
            slab.used_vertex_count(),
            0,
            "slab {:?} shut down while in use",
            slab.id()
        );
        self.slab_count -= 1;
        self.capacity_bytes -= slab.capacity_bytes();
    }

    #[inline]
    pub fn slab_count(&self) -> usize {
        self.slab_count
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// `"<n> slabs <MiB>Mb occ:<pct>"`
    pub fn debug_summary(&self) -> String {
        let occupancy = if self.capacity_bytes > 0 {
            self.used_bytes * 100 / self.capacity_bytes
        } else {
            0
        };
        format!(
            "{} slabs {}Mb occ:{}",
            self.slab_count,
            self.capacity_bytes / 0x100000,
            occupancy
        )
    }
}
