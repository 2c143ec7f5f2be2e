use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::TaskError;

/// Runs before any distance-ranked render task.
pub const PRIVILEGED_PRIORITY: i32 = i32::MIN;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Work item; receives the worker's private context.
pub type Task<C> = Box<dyn FnOnce(&mut C) -> Result<(), TaskError> + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRole {
    /// Only takes render-lane tasks.
    Render,
    /// Only takes server-lane tasks.
    Server,
    /// Alternates which lane it checks first.
    Mixed,
}

struct RenderTask<C> {
    priority: i32,
    seq: u64,
    task: Task<C>,
}

impl<C> PartialEq for RenderTask<C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<C> Eq for RenderTask<C> {}

impl<C> PartialOrd for RenderTask<C> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for RenderTask<C> {
    // BinaryHeap is a max-heap: smaller priority, then earlier seq, must compare greater.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared<C> {
    render: Mutex<BinaryHeap<RenderTask<C>>>,
    server_rx: Receiver<Task<C>>,
    // one token per render push, capped at the worker count
    render_wake_tx: Sender<()>,
    render_wake_rx: Receiver<()>,
    // disconnects on shutdown
    shutdown_rx: Receiver<()>,
    shutdown: AtomicBool,
    next_seq: AtomicU64,
    q_render: AtomicUsize,
    q_server: AtomicUsize,
    inflight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C> Shared<C> {
    fn new(
        server_rx: Receiver<Task<C>>,
        shutdown_rx: Receiver<()>,
        worker_count: usize,
    ) -> Self {
        let (render_wake_tx, render_wake_rx) = bounded(worker_count.max(1));
        Self {
            render: Mutex::new(BinaryHeap::new()),
            server_rx,
            render_wake_tx,
            render_wake_rx,
            shutdown_rx,
            shutdown: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            q_render: AtomicUsize::new(0),
            q_server: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn wake_render(&self) {
        // a full channel already holds enough tokens to wake every parked worker
        let _ = self.render_wake_tx.try_send(());
    }

    fn took_server(&self, task: Task<C>, ctx: &mut C) {
        self.q_server.fetch_sub(1, Ordering::Relaxed);
        self.run(task, ctx);
    }

    fn pop_render(&self) -> Option<Task<C>> {
        let task = lock(&self.render).pop()?;
        self.q_render.fetch_sub(1, Ordering::Relaxed);
        Some(task.task)
    }

    fn pop_server(&self) -> Option<Task<C>> {
        let task = self.server_rx.try_recv().ok()?;
        self.q_server.fetch_sub(1, Ordering::Relaxed);
        Some(task)
    }

    fn take(&self, role: WorkerRole, render_first: &mut bool) -> Option<Task<C>> {
        match role {
            WorkerRole::Render => self.pop_render(),
            WorkerRole::Server => self.pop_server(),
            WorkerRole::Mixed => {
                let task = if *render_first {
                    self.pop_render().or_else(|| self.pop_server())
                } else {
                    self.pop_server().or_else(|| self.pop_render())
                };
                if task.is_some() {
                    *render_first = !*render_first;
                }
                task
            }
        }
    }

    fn run(&self, task: Task<C>, ctx: &mut C) {
        self.inflight.fetch_add(1, Ordering::Relaxed);
        let outcome = catch_unwind(AssertUnwindSafe(|| task(ctx)));
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(TaskError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(err) = error {
            self.failed.fetch_add(1, Ordering::Relaxed);
            log::error!(target: "executor", "{}", err);
        }
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn worker_loop<C>(shared: Arc<Shared<C>>, role: WorkerRole, mut ctx: C) {
    let mut render_first = true;
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        if let Some(task) = shared.take(role, &mut render_first) {
            shared.run(task, &mut ctx);
            continue;
        }
        match role {
            WorkerRole::Render => select! {
                recv(shared.render_wake_rx) -> _ => {}
                recv(shared.shutdown_rx) -> _ => break,
            },
            WorkerRole::Server => select! {
                recv(shared.server_rx) -> res => match res {
                    Ok(task) => shared.took_server(task, &mut ctx),
                    Err(_) => break,
                },
                recv(shared.shutdown_rx) -> _ => break,
            },
            WorkerRole::Mixed => select! {
                recv(shared.render_wake_rx) -> _ => {}
                recv(shared.server_rx) -> res => match res {
                    Ok(task) => shared.took_server(task, &mut ctx),
                    Err(_) => break,
                },
                recv(shared.shutdown_rx) -> _ => break,
            },
        }
    }
}

struct ReportState {
    last: Option<Instant>,
    last_completed: usize,
    text: String,
}

/// Shared worker pool for terrain work.
///
/// Render tasks are ordered by priority (smaller first, FIFO among equals); server tasks are
/// FIFO. One worker serves each lane exclusively and the rest alternate between them. Every
/// worker owns a context built by the factory on its own thread.
pub struct SharedTerrainExecutor<C: 'static> {
    shared: Arc<Shared<C>>,
    server_tx: Sender<Task<C>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    _pool: Arc<ThreadPool>,
    worker_count: usize,
    report: Mutex<ReportState>,
}

impl<C: 'static> SharedTerrainExecutor<C> {
    /// Pool sized `max(4, available_parallelism - 1)`.
    pub fn new<F>(context_factory: F) -> Result<Self, TaskError>
    where
        F: Fn(usize) -> C + Send + Sync + 'static,
    {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_workers(cpus.saturating_sub(1).max(4), context_factory)
    }

    pub fn with_workers<F>(worker_count: usize, context_factory: F) -> Result<Self, TaskError>
    where
        F: Fn(usize) -> C + Send + Sync + 'static,
    {
        let worker_count = worker_count.max(2);
        let (server_tx, server_rx) = unbounded::<Task<C>>();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared::new(server_rx, shutdown_rx, worker_count));

        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(worker_count)
                .thread_name(|i| format!("vista-terrain-{i}"))
                .build()
                .map_err(|e| TaskError::Spawn(e.to_string()))?,
        );
        let factory = Arc::new(context_factory);
        for i in 0..worker_count {
            let role = match i {
                0 => WorkerRole::Render,
                1 => WorkerRole::Server,
                _ => WorkerRole::Mixed,
            };
            let shared = Arc::clone(&shared);
            let factory = Arc::clone(&factory);
            pool.spawn(move || {
                let ctx = factory(i);
                worker_loop(shared, role, ctx);
            });
        }
        log::info!(target: "executor", "terrain executor started with {} workers", worker_count);

        Ok(Self {
            shared,
            server_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            _pool: pool,
            worker_count,
            report: Mutex::new(ReportState {
                last: None,
                last_completed: 0,
                text: String::new(),
            }),
        })
    }

    /// Queues a render-lane task. Smaller priorities run first.
    pub fn execute_render<F>(&self, priority: i32, task: F)
    where
        F: FnOnce(&mut C) -> Result<(), TaskError> + Send + 'static,
    {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        self.shared.q_render.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.render).push(RenderTask {
            priority,
            seq,
            task: Box::new(task),
        });
        self.shared.wake_render();
    }

    /// Queues a server-lane task, run in submission order.
    pub fn execute_server<F>(&self, task: F)
    where
        F: FnOnce(&mut C) -> Result<(), TaskError> + Send + 'static,
    {
        self.shared.q_server.fetch_add(1, Ordering::Relaxed);
        if self.server_tx.send(Box::new(task)).is_err() {
            self.shared.q_server.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Drops every queued render task. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut heap = lock(&self.shared.render);
            let n = heap.len();
            heap.clear();
            n
        };
        self.shared.q_render.fetch_sub(dropped, Ordering::Relaxed);
        if dropped > 0 {
            log::debug!(target: "executor", "cleared {} queued render tasks", dropped);
        }
        dropped
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// `(render queued, server queued, running)`
    pub fn queue_debug_counts(&self) -> (usize, usize, usize) {
        (
            self.shared.q_render.load(Ordering::Relaxed),
            self.shared.q_server.load(Ordering::Relaxed),
            self.shared.inflight.load(Ordering::Relaxed),
        )
    }

    pub fn completed_count(&self) -> usize {
        self.shared.completed.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> usize {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// One-line queue summary, refreshed at most once per second.
    pub fn debug_report(&self) -> String {
        let now = Instant::now();
        let mut report = lock(&self.report);
        let due = report
            .last
            .is_none_or(|last| now.duration_since(last) >= REPORT_INTERVAL);
        if due {
            let completed = self.completed_count();
            let elapsed = report
                .last
                .map(|last| now.duration_since(last).as_secs_f64())
                .unwrap_or(1.0)
                .max(f64::EPSILON);
            let rate = (completed - report.last_completed) as f64 / elapsed;
            let (render, server, running) = self.queue_debug_counts();
            report.text = format!(
                "Terrain tasks: {} render {} server queued, {} running, {:.0}/s",
                render, server, running, rate
            );
            report.last = Some(now);
            report.last_completed = completed;
        }
        report.text.clone()
    }

    /// Stops the workers after their current task. Queued tasks are dropped.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            log::debug!(target: "executor", "terrain executor shutting down");
        }
        lock(&self.shutdown_tx).take();
    }
}

impl<C: 'static> Drop for SharedTerrainExecutor<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(priority: i32, seq: u64) -> RenderTask<()> {
        RenderTask {
            priority,
            seq,
            task: Box::new(|_: &mut ()| Ok(())),
        }
    }

    #[test]
    fn render_heap_orders_by_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(5, 0));
        heap.push(entry(1, 1));
        heap.push(entry(5, 2));
        heap.push(entry(PRIVILEGED_PRIORITY, 3));
        heap.push(entry(1, 4));
        let order: Vec<(i32, u64)> =
            std::iter::from_fn(|| heap.pop().map(|t| (t.priority, t.seq))).collect();
        assert_eq!(
            order,
            vec![(PRIVILEGED_PRIORITY, 3), (1, 1), (1, 4), (5, 0), (5, 2)]
        );
    }

    #[test]
    fn render_wake_tokens_are_capped() {
        let (_tx, rx) = unbounded::<Task<()>>();
        let (_shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Shared::new(rx, shutdown_rx, 2);
        for _ in 0..5 {
            shared.wake_render();
        }
        assert_eq!(shared.render_wake_rx.len(), 2);
    }

    #[test]
    fn mixed_role_alternates_lanes() {
        let (tx, rx) = unbounded::<Task<()>>();
        let (_shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Shared::new(rx, shutdown_rx, 2);
        for seq in 0..2 {
            lock(&shared.render).push(entry(0, seq));
            shared.q_render.fetch_add(1, Ordering::Relaxed);
            let _ = tx.send(Box::new(|_: &mut ()| Ok(())));
            shared.q_server.fetch_add(1, Ordering::Relaxed);
        }
        let mut render_first = true;
        assert!(shared.take(WorkerRole::Mixed, &mut render_first).is_some());
        assert_eq!(shared.q_render.load(Ordering::Relaxed), 1);
        assert!(shared.take(WorkerRole::Mixed, &mut render_first).is_some());
        assert_eq!(shared.q_server.load(Ordering::Relaxed), 1);
        assert!(shared.take(WorkerRole::Render, &mut render_first).is_some());
        assert!(shared.take(WorkerRole::Render, &mut render_first).is_none());
        assert!(shared.take(WorkerRole::Server, &mut render_first).is_some());
    }
}
