//! Software occlusion raster: fixed-point triangle setup, 8×8 tile coverage and the occluder.
#![forbid(unsafe_code)]

mod clip;
pub mod constants;
mod occluder;
mod tile;
mod triangle;

pub use occluder::{Occluder, OccluderStats};
pub use tile::TileRaster;
pub use triangle::{BoundsResult, ProjectedVertex, RasterContext};
