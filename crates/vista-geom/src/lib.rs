//! Region coordinates, faces, packed occluder boxes and typed epochs (no renderer dependency).
#![forbid(unsafe_code)]

pub mod epoch;
mod face;
mod packed_box;
mod region_origin;

pub use epoch::Epoch;
pub use face::{Face, FaceFlags};
pub use packed_box::PackedBox;
pub use region_origin::{REGION_BLOCK_SHIFT, REGION_SIZE, RegionOrigin};
