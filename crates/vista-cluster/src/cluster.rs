use hashbrown::HashMap;
use vista_geom::RegionOrigin;

use crate::error::GfxError;
use crate::gfx::Gfx;
use crate::slab::{BYTES_PER_SLAB_VERTEX, QUAD_VERTEX_COUNT, Slab, SlabAllocator, SlabId};
use crate::sync::{BufferSynchronizer, Retired};

/// Draw-order realm. Solid geometry may be reordered freely; translucent may not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexClusterRealm {
    Solid,
    Translucent,
}

/// One contiguous range of a region's vertices inside a slab.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlabAllocation {
    pub slab: SlabId,
    pub base_vertex: u32,
    pub vertex_count: u32,
}

impl SlabAllocation {
    /// Index count for the range: six triangle vertices per quad.
    #[inline]
    pub fn tri_vertex_count(&self) -> i32 {
        (self.vertex_count / QUAD_VERTEX_COUNT * 6) as i32
    }
}

/// All ranges holding one region's mesh, in vertex order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionAllocation {
    allocations: Vec<SlabAllocation>,
}

impl RegionAllocation {
    #[inline]
    pub fn allocations(&self) -> &[SlabAllocation] {
        &self.allocations
    }

    pub fn vertex_count(&self) -> u32 {
        self.allocations.iter().map(|a| a.vertex_count).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableHandle(pub u32);

/// A region's mesh for one realm, as stored in a [`VertexCluster`].
#[derive(Clone, Debug)]
pub struct ClusteredDrawableStorage {
    origin: RegionOrigin,
    realm: VertexClusterRealm,
    allocation: RegionAllocation,
}

impl ClusteredDrawableStorage {
    #[inline]
    pub fn origin(&self) -> RegionOrigin {
        self.origin
    }

    #[inline]
    pub fn realm(&self) -> VertexClusterRealm {
        self.realm
    }

    #[inline]
    pub fn allocation(&self) -> &RegionAllocation {
        &self.allocation
    }

    #[inline]
    pub fn quad_vertex_count(&self) -> u32 {
        self.allocation.vertex_count()
    }
}

/// Slabs of one realm and the region meshes packed into them.
///
/// The structure epoch advances whenever a drawable is added or removed, which is what draw
/// lists watch to know their batches went stale.
#[derive(Debug)]
pub struct VertexCluster {
    realm: VertexClusterRealm,
    slabs: Vec<Slab>,
    drawables: HashMap<DrawableHandle, ClusteredDrawableStorage>,
    next_handle: u32,
    structure_epoch: u64,
}

impl VertexCluster {
    pub fn new(realm: VertexClusterRealm) -> Self {
        Self {
            realm,
            slabs: Vec::new(),
            drawables: HashMap::new(),
            next_handle: 0,
            structure_epoch: 0,
        }
    }

    #[inline]
    pub fn realm(&self) -> VertexClusterRealm {
        self.realm
    }

    /// Copies a region's vertices into the cluster, spilling into further slabs as needed.
    /// `vertices` holds whole quads of [`BYTES_PER_SLAB_VERTEX`]-byte vertices.
    pub fn upload(
        &mut self,
        gfx: &mut impl Gfx,
        allocator: &mut SlabAllocator,
        origin: RegionOrigin,
        vertices: &[u8],
    ) -> Result<DrawableHandle, GfxError> {
        debug_assert!(vertices.len() % (BYTES_PER_SLAB_VERTEX * QUAD_VERTEX_COUNT as usize) == 0);
        let mut allocation = RegionAllocation::default();
        if let Err(err) = self.fill(gfx, allocator, vertices, &mut allocation) {
            self.free_ranges(allocator, &allocation);
            self.discard_unused_slabs(gfx, allocator);
            return Err(err);
        }
        self.next_handle += 1;
        let handle = DrawableHandle(self.next_handle);
        log::trace!(
            target: "cluster",
            "{:?} {:?} uploaded {} vertices in {} ranges",
            self.realm,
            origin,
            allocation.vertex_count(),
            allocation.allocations.len()
        );
        self.drawables.insert(
            handle,
            ClusteredDrawableStorage {
                origin,
                realm: self.realm,
                allocation,
            },
        );
        self.structure_epoch += 1;
        Ok(handle)
    }

    fn fill(
        &mut self,
        gfx: &mut impl Gfx,
        allocator: &mut SlabAllocator,
        vertices: &[u8],
        allocation: &mut RegionAllocation,
    ) -> Result<(), GfxError> {
        let mut remaining = (vertices.len() / BYTES_PER_SLAB_VERTEX) as u32;
        let mut offset = 0u32;

        for slab in &mut self.slabs {
            while remaining > 0 {
                let Some((base, count)) = slab.allocate(remaining) else {
                    break;
                };
                allocator.add_to_vertex_count(count);
                allocation.allocations.push(SlabAllocation {
                    slab: slab.id(),
                    base_vertex: base,
                    vertex_count: count,
                });
                upload_range(gfx, slab, base, &vertices[byte_range(offset, count)])?;
                remaining -= count;
                offset += count;
            }
            if remaining == 0 {
                return Ok(());
            }
        }

        while remaining > 0 {
            let mut slab = allocator.claim(gfx, remaining as usize * BYTES_PER_SLAB_VERTEX)?;
            let Some((base, count)) = slab.allocate(remaining) else {
                break;
            };
            allocator.add_to_vertex_count(count);
            allocation.allocations.push(SlabAllocation {
                slab: slab.id(),
                base_vertex: base,
                vertex_count: count,
            });
            let uploaded = upload_range(gfx, &slab, base, &vertices[byte_range(offset, count)]);
            self.slabs.push(slab);
            uploaded?;
            remaining -= count;
            offset += count;
        }
        Ok(())
    }

    fn free_ranges(&mut self, allocator: &mut SlabAllocator, allocation: &RegionAllocation) {
        for a in allocation.allocations() {
            if let Some(slab) = self.slabs.iter_mut().find(|s| s.id() == a.slab) {
                slab.free(a.base_vertex, a.vertex_count);
                allocator.remove_from_vertex_count(a.vertex_count);
            }
        }
    }

    /// Deletes slabs claimed by a failed upload. They were never drawn from, so no fence is
    /// needed.
    fn discard_unused_slabs(&mut self, gfx: &mut impl Gfx, allocator: &mut SlabAllocator) {
        let mut i = 0;
        while i < self.slabs.len() {
            if self.slabs[i].used_vertex_count() == 0 {
                let slab = self.slabs.swap_remove(i);
                allocator.notify_shutdown(&slab);
                log::debug!(target: "cluster", "{:?} slab {:?} discarded", self.realm, slab.id());
                gfx.delete_buffer(slab.buffer());
            } else {
                i += 1;
            }
        }
    }

    /// Frees a drawable's ranges. Slabs left empty are shut down and their buffers handed to
    /// `sync` for deletion once the GPU is done with them.
    pub fn release(
        &mut self,
        handle: DrawableHandle,
        allocator: &mut SlabAllocator,
        sync: &mut BufferSynchronizer,
    ) -> bool {
        let Some(drawable) = self.drawables.remove(&handle) else {
            return false;
        };
        self.free_ranges(allocator, &drawable.allocation);
        self.shutdown_empty_slabs(allocator, sync);
        self.structure_epoch += 1;
        true
    }

    fn shutdown_empty_slabs(&mut self, allocator: &mut SlabAllocator, sync: &mut BufferSynchronizer) {
        let mut i = 0;
        while i < self.slabs.len() {
            if self.slabs[i].used_vertex_count() == 0 {
                let slab = self.slabs.swap_remove(i);
                allocator.notify_shutdown(&slab);
                log::debug!(target: "cluster", "{:?} slab {:?} shut down", self.realm, slab.id());
                sync.accept(Retired::Buffer(slab.buffer()));
            } else {
                i += 1;
            }
        }
    }

    /// Releases every drawable, e.g. on world unload.
    pub fn release_all(&mut self, allocator: &mut SlabAllocator, sync: &mut BufferSynchronizer) {
        let handles: Vec<DrawableHandle> = self.drawables.keys().copied().collect();
        for handle in handles {
            self.release(handle, allocator, sync);
        }
        self.shutdown_empty_slabs(allocator, sync);
    }

    #[inline]
    pub fn get(&self, handle: DrawableHandle) -> Option<&ClusteredDrawableStorage> {
        self.drawables.get(&handle)
    }

    pub fn slab(&self, id: SlabId) -> Option<&Slab> {
        self.slabs.iter().find(|s| s.id() == id)
    }

    #[inline]
    pub fn slabs(&self) -> &[Slab] {
        &self.slabs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    #[inline]
    pub fn structure_epoch(&self) -> u64 {
        self.structure_epoch
    }

    pub fn used_vertex_count(&self) -> u32 {
        self.slabs.iter().map(Slab::used_vertex_count).sum()
    }

    pub fn debug_summary(&self) -> String {
        format!(
            "{:?}: {} regions in {} slabs",
            self.realm,
            self.drawables.len(),
            self.slabs.len()
        )
    }
}

#[inline]
fn byte_range(offset: u32, count: u32) -> std::ops::Range<usize> {
    offset as usize * BYTES_PER_SLAB_VERTEX..(offset + count) as usize * BYTES_PER_SLAB_VERTEX
}

fn upload_range(gfx: &mut impl Gfx, slab: &Slab, base: u32, bytes: &[u8]) -> Result<(), GfxError> {
    gfx.upload(slab.buffer(), base as usize * BYTES_PER_SLAB_VERTEX, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::RecordingGfx;
    use crate::slab::SLAB_QUAD_VERTEX_COUNT_INCREMENT;

    fn quads(vertices: u32) -> Vec<u8> {
        vec![0; vertices as usize * BYTES_PER_SLAB_VERTEX]
    }

    #[test]
    fn large_region_spills_into_second_slab() {
        let mut gfx = RecordingGfx::new();
        let mut alloc = SlabAllocator::new();
        let mut cluster = VertexCluster::new(VertexClusterRealm::Solid);
        let a = cluster
            .upload(&mut gfx, &mut alloc, RegionOrigin::default(), &quads(3000))
            .unwrap();
        let b = cluster
            .upload(&mut gfx, &mut alloc, RegionOrigin::default(), &quads(3000))
            .unwrap();
        assert_eq!(cluster.get(a).unwrap().allocation().allocations().len(), 1);
        let spans = cluster.get(b).unwrap().allocation().allocations();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].vertex_count, SLAB_QUAD_VERTEX_COUNT_INCREMENT - 3000);
        assert_ne!(spans[0].slab, spans[1].slab);
        assert_eq!(alloc.slab_count(), 2);
        assert_eq!(alloc.used_bytes(), 6000 * BYTES_PER_SLAB_VERTEX);
    }

    #[test]
    fn failed_upload_rolls_back() {
        let mut gfx = RecordingGfx::new();
        let mut alloc = SlabAllocator::new();
        let mut cluster = VertexCluster::new(VertexClusterRealm::Solid);
        cluster
            .upload(&mut gfx, &mut alloc, RegionOrigin::default(), &quads(4000))
            .unwrap();
        gfx.fail_next_creates(1);
        let epoch = cluster.structure_epoch();
        assert!(
            cluster
                .upload(&mut gfx, &mut alloc, RegionOrigin::default(), &quads(400))
                .is_err()
        );
        assert_eq!(cluster.structure_epoch(), epoch);
        assert_eq!(cluster.used_vertex_count(), 4000);
        assert_eq!(alloc.used_bytes(), 4000 * BYTES_PER_SLAB_VERTEX);
    }

    #[test]
    fn failed_upload_into_new_slab_frees_it() {
        let mut gfx = RecordingGfx::new();
        let mut alloc = SlabAllocator::new();
        let mut cluster = VertexCluster::new(VertexClusterRealm::Solid);
        gfx.fail_next_uploads(1);
        assert!(
            cluster
                .upload(&mut gfx, &mut alloc, RegionOrigin::default(), &quads(400))
                .is_err()
        );
        assert_eq!(alloc.slab_count(), 0);
        assert_eq!(alloc.capacity_bytes(), 0);
        assert_eq!(alloc.used_bytes(), 0);
        assert_eq!(gfx.live_buffers(), 0);
        assert_eq!(cluster.used_vertex_count(), 0);

        // the next upload claims a fresh slab normally
        cluster
            .upload(&mut gfx, &mut alloc, RegionOrigin::default(), &quads(400))
            .unwrap();
        assert_eq!(alloc.slab_count(), 1);
    }

    #[test]
    fn tri_vertex_count_is_six_per_quad() {
        let a = SlabAllocation {
            slab: SlabId(1),
            base_vertex: 0,
            vertex_count: 8,
        };
        assert_eq!(a.tri_vertex_count(), 12);
    }
}
