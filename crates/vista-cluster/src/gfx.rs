use hashbrown::{HashMap, HashSet};

use crate::error::GfxError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceId(pub u64);

/// Result of waiting on a fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    AlreadySignaled,
    ConditionSatisfied,
    TimeoutExpired,
    WaitFailed,
}

impl FenceStatus {
    #[inline]
    pub fn is_signaled(self) -> bool {
        matches!(
            self,
            FenceStatus::AlreadySignaled | FenceStatus::ConditionSatisfied
        )
    }
}

/// The slice of the graphics API the terrain renderer needs. All calls happen on the thread
/// that owns the GPU context.
pub trait Gfx {
    fn create_vertex_buffer(&mut self, capacity_bytes: usize) -> Result<BufferId, GfxError>;
    fn delete_buffer(&mut self, buffer: BufferId);
    fn upload(&mut self, buffer: BufferId, offset_bytes: usize, data: &[u8])
    -> Result<(), GfxError>;
    fn bind_vertex_buffer(&mut self, buffer: BufferId);
    /// Triangle multi-draw over the bound buffer with the shared quad index buffer.
    fn multi_draw_elements_base_vertex(&mut self, tri_vertex_counts: &[i32], base_vertices: &[i32]);
    fn fence_sync(&mut self) -> FenceId;
    fn client_wait_sync(&mut self, fence: FenceId, timeout_ns: u64) -> FenceStatus;
    fn delete_sync(&mut self, fence: FenceId);
}

/// Commands seen by [`RecordingGfx`], in submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxCommand {
    Create { buffer: BufferId, capacity_bytes: usize },
    Delete(BufferId),
    Upload { buffer: BufferId, offset_bytes: usize, len: usize },
    Bind(BufferId),
    MultiDraw { counts: Vec<i32>, base_vertices: Vec<i32> },
    Fence(FenceId),
}

/// Headless [`Gfx`] that records commands and simulates fence completion.
///
/// Fences signal only when [`RecordingGfx::advance_gpu`] is called, which lets callers
/// observe exactly when deferred releases happen.
#[derive(Debug, Default)]
pub struct RecordingGfx {
    commands: Vec<GfxCommand>,
    buffers: HashMap<BufferId, usize>,
    pending_fences: HashSet<FenceId>,
    signaled_fences: HashSet<FenceId>,
    next_buffer: u32,
    next_fence: u64,
    fail_creates: usize,
    fail_uploads: usize,
}

impl RecordingGfx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` buffer creations fail.
    pub fn fail_next_creates(&mut self, n: usize) {
        self.fail_creates = n;
    }

    /// Makes the next `n` uploads fail.
    pub fn fail_next_uploads(&mut self, n: usize) {
        self.fail_uploads = n;
    }

    /// Marks every fence issued so far as signaled.
    pub fn advance_gpu(&mut self) {
        self.signaled_fences.extend(self.pending_fences.drain());
    }

    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GfxCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_buffer_bytes(&self) -> usize {
        self.buffers.values().sum()
    }

    pub fn live_fences(&self) -> usize {
        self.pending_fences.len() + self.signaled_fences.len()
    }

    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GfxCommand::MultiDraw { .. }))
            .count()
    }
}

impl Gfx for RecordingGfx {
    fn create_vertex_buffer(&mut self, capacity_bytes: usize) -> Result<BufferId, GfxError> {
        if self.fail_creates > 0 {
            self.fail_creates -= 1;
            return Err(GfxError::BufferCreation {
                capacity_bytes,
                reason: "out of memory".to_string(),
            });
        }
        self.next_buffer += 1;
        let buffer = BufferId(self.next_buffer);
        self.buffers.insert(buffer, capacity_bytes);
        self.commands.push(GfxCommand::Create {
            buffer,
            capacity_bytes,
        });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.commands.push(GfxCommand::Delete(buffer));
    }

    fn upload(
        &mut self,
        buffer: BufferId,
        offset_bytes: usize,
        data: &[u8],
    ) -> Result<(), GfxError> {
        let Some(&capacity) = self.buffers.get(&buffer) else {
            return Err(GfxError::UnknownBuffer(buffer));
        };
        if self.fail_uploads > 0 {
            self.fail_uploads -= 1;
            return Err(GfxError::Upload {
                buffer,
                reason: "device lost".to_string(),
            });
        }
        if offset_bytes + data.len() > capacity {
            return Err(GfxError::Upload {
                buffer,
                reason: format!(
                    "range {}..{} exceeds capacity {}",
                    offset_bytes,
                    offset_bytes + data.len(),
                    capacity
                ),
            });
        }
        self.commands.push(GfxCommand::Upload {
            buffer,
            offset_bytes,
            len: data.len(),
        });
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId) {
        self.commands.push(GfxCommand::Bind(buffer));
    }

    fn multi_draw_elements_base_vertex(&mut self, tri_vertex_counts: &[i32], base_vertices: &[i32]) {
        self.commands.push(GfxCommand::MultiDraw {
            counts: tri_vertex_counts.to_vec(),
            base_vertices: base_vertices.to_vec(),
        });
    }

    fn fence_sync(&mut self) -> FenceId {
        self.next_fence += 1;
        let fence = FenceId(self.next_fence);
        self.pending_fences.insert(fence);
        self.commands.push(GfxCommand::Fence(fence));
        fence
    }

    fn client_wait_sync(&mut self, fence: FenceId, timeout_ns: u64) -> FenceStatus {
        if self.signaled_fences.contains(&fence) {
            FenceStatus::AlreadySignaled
        } else if self.pending_fences.contains(&fence) {
            if timeout_ns > 0 {
                // a blocking wait lets the simulated GPU finish this fence
                self.pending_fences.remove(&fence);
                self.signaled_fences.insert(fence);
                FenceStatus::ConditionSatisfied
            } else {
                FenceStatus::TimeoutExpired
            }
        } else {
            FenceStatus::WaitFailed
        }
    }

    fn delete_sync(&mut self, fence: FenceId) {
        self.pending_fences.remove(&fence);
        self.signaled_fences.remove(&fence);
    }
}
