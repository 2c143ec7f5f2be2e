use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use vista_geom::PackedBox;

use crate::error::TaskError;

const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(5);
const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Output storage a region build writes into.
#[derive(Debug, Default)]
pub struct BuildBuffers {
    pub solid: Vec<u8>,
    pub translucent: Vec<u8>,
    pub occluders: Vec<PackedBox>,
    pub bounds: Option<PackedBox>,
}

impl BuildBuffers {
    fn reset(&mut self) {
        self.solid.clear();
        self.translucent.clear();
        self.occluders.clear();
        self.bounds = None;
    }

    #[inline]
    pub fn has_geometry(&self) -> bool {
        !self.solid.is_empty() || !self.translucent.is_empty()
    }
}

/// Bounded pool of [`BuildBuffers`].
///
/// Buffers travel with build results to the render thread and come back when the result is
/// dropped, so the pool also bounds how much finished-but-unuploaded output can pile up.
pub struct BuildBufferPool {
    available_tx: Sender<BuildBuffers>,
    available_rx: Receiver<BuildBuffers>,
    allocated: AtomicUsize,
    max_buffers: usize,
    retry_wait: Duration,
    max_attempts: u32,
}

impl BuildBufferPool {
    pub fn new(max_buffers: usize) -> Self {
        Self::with_retry(max_buffers, DEFAULT_RETRY_WAIT, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_retry(max_buffers: usize, retry_wait: Duration, max_attempts: u32) -> Self {
        debug_assert!(max_buffers > 0);
        let (tx, rx) = bounded(max_buffers);
        Self {
            available_tx: tx,
            available_rx: rx,
            allocated: AtomicUsize::new(0),
            max_buffers,
            retry_wait,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_capacity_from_workers(worker_count: usize) -> Arc<Self> {
        Arc::new(Self::new(worker_count.max(1) * 2))
    }

    /// Takes a buffer set, creating one while under capacity, otherwise waiting for one to
    /// come back. Gives up after the retry budget.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledBuffers, TaskError> {
        if let Ok(buffers) = self.available_rx.try_recv() {
            return Ok(self.wrap(buffers));
        }

        for attempt in 1..=self.max_attempts {
            let current = self.allocated.load(Ordering::Acquire);
            if current < self.max_buffers {
                let prev = self.allocated.fetch_add(1, Ordering::AcqRel);
                if prev < self.max_buffers {
                    return Ok(self.wrap(BuildBuffers::default()));
                }
                self.allocated.fetch_sub(1, Ordering::AcqRel);
            }

            match self.available_rx.recv_timeout(self.retry_wait) {
                Ok(buffers) => return Ok(self.wrap(buffers)),
                Err(_) => {
                    log::trace!(target: "executor", "builder buffers busy, attempt {}", attempt);
                }
            }
        }
        Err(TaskError::ResourcesExhausted {
            attempts: self.max_attempts,
        })
    }

    fn wrap(self: &Arc<Self>, mut buffers: BuildBuffers) -> PooledBuffers {
        buffers.reset();
        PooledBuffers {
            buffers,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, buffers: BuildBuffers) {
        let _ = self.available_tx.send(buffers);
    }

    /// Buffer sets currently checked out.
    pub fn in_use(&self) -> usize {
        self.allocated
            .load(Ordering::Acquire)
            .saturating_sub(self.available_rx.len())
    }
}

/// Checked-out [`BuildBuffers`]; returns to the pool on drop.
pub struct PooledBuffers {
    buffers: BuildBuffers,
    pool: Arc<BuildBufferPool>,
}

impl Deref for PooledBuffers {
    type Target = BuildBuffers;

    fn deref(&self) -> &Self::Target {
        &self.buffers
    }
}

impl DerefMut for PooledBuffers {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffers
    }
}

impl Drop for PooledBuffers {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffers));
    }
}

impl std::fmt::Debug for PooledBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffers")
            .field("solid_bytes", &self.buffers.solid.len())
            .field("translucent_bytes", &self.buffers.translucent.len())
            .field("occluders", &self.buffers.occluders.len())
            .finish()
    }
}
