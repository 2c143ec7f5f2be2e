//! Clustered slab vertex storage, batched draw lists and fence-gated GPU resource release.
#![forbid(unsafe_code)]

mod cluster;
mod direct;
mod draw_list;
mod error;
mod gfx;
mod slab;
mod sync;

pub use cluster::{
    ClusteredDrawableStorage, DrawableHandle, RegionAllocation, SlabAllocation, VertexCluster,
    VertexClusterRealm,
};
pub use direct::{DirectBuffer, DirectBufferAllocator};
pub use draw_list::{ClusterDrawList, DrawSpec};
pub use error::GfxError;
pub use gfx::{BufferId, FenceId, FenceStatus, Gfx, GfxCommand, RecordingGfx};
pub use slab::{
    BYTES_PER_SLAB_VERTEX, QUAD_VERTEX_COUNT, SLAB_BYTES_INCREMENT,
    SLAB_QUAD_VERTEX_COUNT_INCREMENT, Slab, SlabAllocator, SlabId,
};
pub use sync::{BufferSynchronizer, MAX_PENDING_GENERATIONS, Retired};
