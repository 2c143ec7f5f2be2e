//! Voxel terrain renderer core: occlusion-culled region visibility feeding clustered slab draws.
#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod mesher;
pub mod renderer;

pub use config::{RenderConfig, load_config_from_path};
pub use errors::ErrorReporter;
pub use mesher::{Block, BlockMesher, BlockSource, HeightfieldWorld};
pub use renderer::{CameraState, FrameStats, RenderRegion, SHADOW_CASCADES, WorldRenderer};
