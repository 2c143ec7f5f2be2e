use std::fmt;

use crate::gfx::BufferId;

/// Failures reported by the GPU command surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfxError {
    BufferCreation { capacity_bytes: usize, reason: String },
    Upload { buffer: BufferId, reason: String },
    UnknownBuffer(BufferId),
}

impl GfxError {
    /// Stable key used to collapse repeats of the same failure.
    pub fn key(&self) -> &'static str {
        match self {
            GfxError::BufferCreation { .. } => "gfx.buffer_creation",
            GfxError::Upload { .. } => "gfx.upload",
            GfxError::UnknownBuffer(_) => "gfx.unknown_buffer",
        }
    }
}

impl fmt::Display for GfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GfxError::BufferCreation {
                capacity_bytes,
                reason,
            } => write!(
                f,
                "failed to create vertex buffer of {} bytes: {}",
                capacity_bytes, reason
            ),
            GfxError::Upload { buffer, reason } => {
                write!(f, "failed to upload to buffer {:?}: {}", buffer, reason)
            }
            GfxError::UnknownBuffer(buffer) => write!(f, "buffer {:?} does not exist", buffer),
        }
    }
}

impl std::error::Error for GfxError {}
