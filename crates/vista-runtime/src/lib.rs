//! Terrain worker pool, proto-region build slots and region build tasks.
#![forbid(unsafe_code)]

mod build;
mod buffer_pool;
mod error;
mod executor;
mod proto;

pub use buffer_pool::{BuildBufferPool, BuildBuffers, PooledBuffers};
pub use build::{RegionBuildJob, RegionBuildOutput, RegionMesher, run_region_build, sort_translucent_quads};
pub use error::TaskError;
pub use executor::{PRIVILEGED_PRIORITY, SharedTerrainExecutor, Task, WorkerRole};
pub use proto::{BuildKind, EnqueueOutcome, FinishOutcome, ProtoRegionSlot};
