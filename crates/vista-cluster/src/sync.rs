use std::collections::VecDeque;

use crate::direct::DirectBuffer;
use crate::gfx::{BufferId, FenceId, FenceStatus, Gfx};

/// Fenced generations allowed to queue up before a checkpoint waits on the oldest one.
pub const MAX_PENDING_GENERATIONS: usize = 4;

const OVERFLOW_WAIT_NS: u64 = 1_000_000;
const SHUTDOWN_WAIT_NS: u64 = 100_000_000;

/// A resource the GPU may still be reading.
#[derive(Debug)]
pub enum Retired {
    Buffer(BufferId),
    Host(DirectBuffer),
}

impl Retired {
    fn release(self, gfx: &mut impl Gfx) {
        match self {
            Retired::Buffer(buffer) => gfx.delete_buffer(buffer),
            Retired::Host(buffer) => buffer.release(),
        }
    }
}

#[derive(Debug)]
struct SyncList {
    fence: FenceId,
    items: Vec<Retired>,
}

/// Defers resource release until a fence issued after their last use has signaled.
///
/// Resources retired during a frame collect in one list; [`BufferSynchronizer::check_point`]
/// fences that list and queues it. Lists are released strictly in fence order.
#[derive(Debug, Default)]
pub struct BufferSynchronizer {
    queue: VecDeque<SyncList>,
    current: Vec<Retired>,
}

impl BufferSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, item: Retired) {
        self.current.push(item);
    }

    /// Called once per frame after the frame's commands were submitted.
    pub fn check_point(&mut self, gfx: &mut impl Gfx) {
        self.release_buffers(gfx);

        if !self.current.is_empty() {
            let fence = gfx.fence_sync();
            let items = std::mem::take(&mut self.current);
            log::trace!(target: "gfx", "fenced {} retired resources as {:?}", items.len(), fence);
            self.queue.push_back(SyncList { fence, items });
        }

        while self.queue.len() > MAX_PENDING_GENERATIONS {
            let Some(front) = self.queue.front() else {
                break;
            };
            let status = gfx.client_wait_sync(front.fence, OVERFLOW_WAIT_NS);
            if status == FenceStatus::TimeoutExpired {
                log::debug!(
                    target: "gfx",
                    "{} fenced generations pending; GPU is behind",
                    self.queue.len()
                );
                break;
            }
            self.release_front(gfx, status);
        }
    }

    /// Releases every leading list whose fence has signaled, without blocking.
    fn release_buffers(&mut self, gfx: &mut impl Gfx) {
        while let Some(front) = self.queue.front() {
            let status = gfx.client_wait_sync(front.fence, 0);
            if status == FenceStatus::TimeoutExpired {
                break;
            }
            self.release_front(gfx, status);
        }
    }

    fn release_front(&mut self, gfx: &mut impl Gfx, status: FenceStatus) {
        let Some(list) = self.queue.pop_front() else {
            return;
        };
        if status == FenceStatus::WaitFailed {
            log::warn!(
                target: "gfx",
                "fence {:?} wait failed; releasing {} resources",
                list.fence,
                list.items.len()
            );
        }
        for item in list.items {
            item.release(gfx);
        }
        gfx.delete_sync(list.fence);
    }

    /// Releases everything, waiting briefly on each outstanding fence.
    pub fn shutdown(&mut self, gfx: &mut impl Gfx) {
        while let Some(front) = self.queue.front() {
            let status = gfx.client_wait_sync(front.fence, SHUTDOWN_WAIT_NS);
            self.release_front(gfx, status);
        }
        for item in self.current.drain(..) {
            item.release(gfx);
        }
    }

    #[inline]
    pub fn pending_generations(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_items(&self) -> usize {
        self.current.len() + self.queue.iter().map(|l| l.items.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::RecordingGfx;

    fn buffer(gfx: &mut RecordingGfx) -> BufferId {
        gfx.create_vertex_buffer(64).unwrap()
    }

    #[test]
    fn buffers_survive_until_fence_signals() {
        let mut gfx = RecordingGfx::new();
        let mut sync = BufferSynchronizer::new();
        let b = buffer(&mut gfx);
        sync.accept(Retired::Buffer(b));
        sync.check_point(&mut gfx);
        assert_eq!(gfx.live_buffers(), 1);
        assert_eq!(sync.pending_generations(), 1);

        sync.check_point(&mut gfx);
        assert_eq!(gfx.live_buffers(), 1);

        gfx.advance_gpu();
        sync.check_point(&mut gfx);
        assert_eq!(gfx.live_buffers(), 0);
        assert_eq!(sync.pending_generations(), 0);
        assert_eq!(gfx.live_fences(), 0);
    }

    #[test]
    fn empty_frames_issue_no_fence() {
        let mut gfx = RecordingGfx::new();
        let mut sync = BufferSynchronizer::new();
        sync.check_point(&mut gfx);
        assert!(gfx.commands().is_empty());
    }

    #[test]
    fn pending_generations_are_bounded() {
        let mut gfx = RecordingGfx::new();
        let mut sync = BufferSynchronizer::new();
        for _ in 0..10 {
            let b = buffer(&mut gfx);
            sync.accept(Retired::Buffer(b));
            sync.check_point(&mut gfx);
            assert!(sync.pending_generations() <= MAX_PENDING_GENERATIONS);
        }
        assert_eq!(gfx.live_buffers(), MAX_PENDING_GENERATIONS);
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut gfx = RecordingGfx::new();
        let mut sync = BufferSynchronizer::new();
        let a = buffer(&mut gfx);
        sync.accept(Retired::Buffer(a));
        sync.check_point(&mut gfx);
        let b = buffer(&mut gfx);
        sync.accept(Retired::Buffer(b));
        sync.shutdown(&mut gfx);
        assert_eq!(gfx.live_buffers(), 0);
        assert_eq!(sync.pending_items(), 0);
    }
}
