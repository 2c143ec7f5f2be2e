use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct Shared {
    open_bytes: AtomicUsize,
    total_bytes: AtomicUsize,
    leak_tx: Sender<usize>,
}

/// Host-side integer arrays handed to the GPU driver (multi-draw counts and base vertices).
///
/// Buffers are expected to be released explicitly, usually by [`crate::BufferSynchronizer`]
/// once the GPU is done with them. A buffer dropped without a release is counted as a leak
/// and reported by the next [`DirectBufferAllocator::update`] sweep.
pub struct DirectBufferAllocator {
    shared: Arc<Shared>,
    leak_rx: Receiver<usize>,
    next_sweep: Option<Instant>,
    last_total: usize,
    sample_bytes: usize,
    recovered_bytes: usize,
}

impl Default for DirectBufferAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectBufferAllocator {
    pub fn new() -> Self {
        let (leak_tx, leak_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                open_bytes: AtomicUsize::new(0),
                total_bytes: AtomicUsize::new(0),
                leak_tx,
            }),
            leak_rx,
            next_sweep: None,
            last_total: 0,
            sample_bytes: 0,
            recovered_bytes: 0,
        }
    }

    /// Allocates a zeroed buffer of `len` 32-bit integers.
    pub fn claim(&self, len: usize) -> DirectBuffer {
        let bytes = len * std::mem::size_of::<i32>();
        self.shared.open_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.shared.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        DirectBuffer {
            data: vec![0; len],
            shared: Some(Arc::clone(&self.shared)),
        }
    }

    #[inline]
    pub fn open_bytes(&self) -> usize {
        self.shared.open_bytes.load(Ordering::Relaxed)
    }

    /// Bytes recovered from leaked buffers by all sweeps so far.
    #[inline]
    pub fn recovered_bytes(&self) -> usize {
        self.recovered_bytes
    }

    /// Sweeps leak reports and samples the allocation rate, at most once per second.
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    pub fn update_at(&mut self, now: Instant) {
        if self.next_sweep.is_some_and(|next| now < next) {
            return;
        }
        self.next_sweep = Some(now + SWEEP_INTERVAL);

        let leaked: usize = self.leak_rx.try_iter().sum();
        if leaked > 0 {
            self.recovered_bytes += leaked;
            log::warn!(
                target: "cluster",
                "direct buffer leak detected; bytes recovered: {}",
                leaked
            );
        }

        let total = self.shared.total_bytes.load(Ordering::Relaxed);
        self.sample_bytes = total - self.last_total;
        self.last_total = total;
    }

    pub fn debug_string(&self) -> String {
        format!(
            "Direct buffers: {:5.1}Mb open, {:5.1}Mb/s",
            self.open_bytes() as f64 / 1_048_576.0,
            self.sample_bytes as f64 / 1_048_576.0
        )
    }
}

/// Integer array claimed from a [`DirectBufferAllocator`].
#[derive(Debug)]
pub struct DirectBuffer {
    data: Vec<i32>,
    shared: Option<Arc<Shared>>,
}

impl DirectBuffer {
    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<i32>()
    }

    /// Returns the memory to the allocator.
    pub fn release(mut self) {
        if let Some(shared) = self.shared.take() {
            shared.open_bytes.fetch_sub(self.bytes(), Ordering::Relaxed);
        }
    }
}

impl Drop for DirectBuffer {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let bytes = self.bytes();
            shared.open_bytes.fetch_sub(bytes, Ordering::Relaxed);
            let _ = shared.leak_tx.send(bytes);
        }
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("open_bytes", &self.open_bytes.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_returns_open_bytes() {
        let alloc = DirectBufferAllocator::new();
        let buf = alloc.claim(8);
        assert_eq!(alloc.open_bytes(), 32);
        buf.release();
        assert_eq!(alloc.open_bytes(), 0);
    }

    #[test]
    fn dropped_buffer_is_recovered_by_sweep() {
        let mut alloc = DirectBufferAllocator::new();
        drop(alloc.claim(4));
        assert_eq!(alloc.open_bytes(), 0);
        let now = Instant::now();
        alloc.update_at(now);
        assert_eq!(alloc.recovered_bytes(), 16);
    }

    #[test]
    fn sweeps_are_throttled() {
        let mut alloc = DirectBufferAllocator::new();
        let now = Instant::now();
        alloc.update_at(now);
        drop(alloc.claim(4));
        alloc.update_at(now + Duration::from_millis(10));
        assert_eq!(alloc.recovered_bytes(), 0);
        alloc.update_at(now + Duration::from_millis(1500));
        assert_eq!(alloc.recovered_bytes(), 16);
    }
}
