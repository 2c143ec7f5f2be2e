use hashbrown::HashMap;

use crate::cluster::{DrawableHandle, SlabAllocation, VertexCluster, VertexClusterRealm};
use crate::direct::{DirectBuffer, DirectBufferAllocator};
use crate::gfx::{BufferId, Gfx};
use crate::slab::SlabId;
use crate::sync::{BufferSynchronizer, Retired};

/// One multi-draw call: a slab plus parallel arrays of index counts and base vertices.
#[derive(Debug)]
pub struct DrawSpec {
    slab: SlabId,
    buffer: BufferId,
    tri_vertex_counts: DirectBuffer,
    base_vertices: DirectBuffer,
}

impl DrawSpec {
    #[inline]
    pub fn slab(&self) -> SlabId {
        self.slab
    }

    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[inline]
    pub fn tri_vertex_counts(&self) -> &[i32] {
        self.tri_vertex_counts.as_slice()
    }

    #[inline]
    pub fn base_vertices(&self) -> &[i32] {
        self.base_vertices.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tri_vertex_counts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tri_vertex_counts.is_empty()
    }

    fn retire(self, sync: &mut BufferSynchronizer) {
        sync.accept(Retired::Host(self.tri_vertex_counts));
        sync.accept(Retired::Host(self.base_vertices));
    }
}

/// Turns an ordered list of drawables from one cluster into batched multi-draw calls.
///
/// Solid lists emit one batch per slab. Translucent lists keep the caller's order and start
/// a new batch whenever consecutive ranges land in different slabs.
#[derive(Debug)]
pub struct ClusterDrawList {
    realm: VertexClusterRealm,
    regions: Vec<DrawableHandle>,
    specs: Vec<DrawSpec>,
    dirty: bool,
    built_epoch: Option<u64>,
}

impl ClusterDrawList {
    pub fn new(realm: VertexClusterRealm) -> Self {
        Self {
            realm,
            regions: Vec::new(),
            specs: Vec::new(),
            dirty: true,
            built_epoch: None,
        }
    }

    #[inline]
    pub fn realm(&self) -> VertexClusterRealm {
        self.realm
    }

    /// Drops the region list; existing batches stay until the next build.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.dirty = true;
    }

    pub fn add(&mut self, handle: DrawableHandle) {
        self.regions.push(handle);
        self.dirty = true;
    }

    #[inline]
    pub fn regions(&self) -> &[DrawableHandle] {
        &self.regions
    }

    /// Forces a rebuild before the next draw.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn needs_build(&self, cluster: &VertexCluster) -> bool {
        self.dirty || self.built_epoch != Some(cluster.structure_epoch())
    }

    /// Rebuilds the batches. Previous batches go to `sync`.
    pub fn build(
        &mut self,
        cluster: &VertexCluster,
        direct: &DirectBufferAllocator,
        sync: &mut BufferSynchronizer,
    ) {
        debug_assert_eq!(cluster.realm(), self.realm);
        self.release(sync);
        match self.realm {
            VertexClusterRealm::Solid => self.build_solid(cluster, direct),
            VertexClusterRealm::Translucent => self.build_translucent(cluster, direct),
        }
        self.dirty = false;
        self.built_epoch = Some(cluster.structure_epoch());
        log::trace!(
            target: "cluster",
            "{:?} draw list: {} regions in {} batches",
            self.realm,
            self.regions.len(),
            self.specs.len()
        );
    }

    fn build_solid(&mut self, cluster: &VertexCluster, direct: &DirectBufferAllocator) {
        let mut slots: HashMap<SlabId, usize> = HashMap::new();
        let mut groups: Vec<Vec<SlabAllocation>> = Vec::new();
        for &handle in &self.regions {
            let Some(drawable) = cluster.get(handle) else {
                continue;
            };
            for alloc in drawable.allocation().allocations() {
                let slot = *slots.entry(alloc.slab).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[slot].push(*alloc);
            }
        }
        for group in &groups {
            self.add_spec(cluster, direct, group);
        }
    }

    fn build_translucent(&mut self, cluster: &VertexCluster, direct: &DirectBufferAllocator) {
        let mut run: Vec<SlabAllocation> = Vec::new();
        let regions = std::mem::take(&mut self.regions);
        for &handle in &regions {
            let Some(drawable) = cluster.get(handle) else {
                continue;
            };
            for alloc in drawable.allocation().allocations() {
                if run.last().is_some_and(|last| last.slab != alloc.slab) {
                    self.add_spec(cluster, direct, &run);
                    run.clear();
                }
                run.push(*alloc);
            }
        }
        self.add_spec(cluster, direct, &run);
        self.regions = regions;
    }

    fn add_spec(
        &mut self,
        cluster: &VertexCluster,
        direct: &DirectBufferAllocator,
        allocs: &[SlabAllocation],
    ) {
        let Some(first) = allocs.first() else {
            return;
        };
        let Some(slab) = cluster.slab(first.slab) else {
            log::warn!(target: "cluster", "draw list references missing slab {:?}", first.slab);
            return;
        };
        let mut counts = direct.claim(allocs.len());
        let mut bases = direct.claim(allocs.len());
        for (i, alloc) in allocs.iter().enumerate() {
            debug_assert_eq!(alloc.slab, first.slab);
            counts.as_mut_slice()[i] = alloc.tri_vertex_count();
            bases.as_mut_slice()[i] = alloc.base_vertex as i32;
        }
        self.specs.push(DrawSpec {
            slab: first.slab,
            buffer: slab.buffer(),
            tri_vertex_counts: counts,
            base_vertices: bases,
        });
    }

    /// Issues one bind and one multi-draw per batch, rebuilding first if stale.
    /// Returns the number of draw calls.
    pub fn draw(
        &mut self,
        gfx: &mut impl Gfx,
        cluster: &VertexCluster,
        direct: &DirectBufferAllocator,
        sync: &mut BufferSynchronizer,
    ) -> usize {
        if self.needs_build(cluster) {
            self.build(cluster, direct, sync);
        }
        for spec in &self.specs {
            gfx.bind_vertex_buffer(spec.buffer);
            gfx.multi_draw_elements_base_vertex(spec.tri_vertex_counts(), spec.base_vertices());
        }
        self.specs.len()
    }

    /// Hands every batch's host arrays to `sync`.
    pub fn release(&mut self, sync: &mut BufferSynchronizer) {
        for spec in self.specs.drain(..) {
            spec.retire(sync);
        }
    }

    #[inline]
    pub fn specs(&self) -> &[DrawSpec] {
        &self.specs
    }
}
