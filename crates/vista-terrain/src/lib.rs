//! Region visibility: positions, potentially-visible sets, camera/shadow visibility and the near-to-far walk.
#![forbid(unsafe_code)]

mod frustum;
mod iterator;
mod position;
mod pvrs;
mod region;
mod storage;
mod visibility;
mod visible_list;

pub use frustum::{FrustumChange, TerrainFrustum};
pub use iterator::{IterationConfig, IterationState, TerrainIterator};
pub use position::{NEAR_SQUARE_CHUNK_DISTANCE, RegionPosition, ShadowParams};
pub use pvrs::PotentiallyVisibleRegionSet;
pub use region::{StoredRegion, TerrainRegion, ViewResult};
pub use storage::{RegionStorage, StorageUpdate};
pub use visibility::{CameraView, ShadowView, ViewKind, Visibility, VisibilityState};
pub use visible_list::{ShadowRegionList, VisibleRegionList};
