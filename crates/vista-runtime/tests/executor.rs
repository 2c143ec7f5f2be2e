use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use vista_geom::{PackedBox, RegionOrigin};
use vista_runtime::{
    BuildBufferPool, BuildBuffers, PRIVILEGED_PRIORITY, ProtoRegionSlot, RegionBuildJob,
    RegionBuildOutput, RegionMesher, SharedTerrainExecutor, TaskError, run_region_build,
};

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn both_lanes_drain() {
    let exec = SharedTerrainExecutor::with_workers(4, |_| ()).unwrap();
    let (tx, rx) = unbounded();
    for i in 0..20 {
        let render_tx = tx.clone();
        exec.execute_render(i, move |_: &mut ()| {
            let _ = render_tx.send(i);
            Ok(())
        });
        let server_tx = tx.clone();
        exec.execute_server(move |_: &mut ()| {
            let _ = server_tx.send(100 + i);
            Ok(())
        });
    }
    exec.execute_render(PRIVILEGED_PRIORITY, move |_: &mut ()| Ok(()));
    let mut seen = Vec::new();
    for _ in 0..40 {
        seen.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    seen.sort();
    let expected: Vec<i32> = (0..20).chain(100..120).collect();
    assert_eq!(seen, expected);
}

#[test]
fn parked_workers_wake_for_late_tasks() {
    let exec = SharedTerrainExecutor::with_workers(3, |_| ()).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let (tx, rx) = unbounded();
    let render_tx = tx.clone();
    exec.execute_render(7, move |_: &mut ()| {
        let _ = render_tx.send("render");
        Ok(())
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "render");
    std::thread::sleep(Duration::from_millis(50));
    exec.execute_server(move |_: &mut ()| {
        let _ = tx.send("server");
        Ok(())
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "server");
    exec.shutdown();
}

#[test]
fn default_pool_has_at_least_four_workers() {
    let exec = SharedTerrainExecutor::new(|_| ()).unwrap();
    assert!(exec.worker_count() >= 4);
}

#[test]
fn panicking_task_is_contained() {
    let exec = SharedTerrainExecutor::with_workers(2, |_| 0u32).unwrap();
    exec.execute_render(0, |_: &mut u32| panic!("mesher blew up"));
    exec.execute_render(1, |_: &mut u32| Err(TaskError::Mesher("bad block".into())));
    assert!(wait_until(Duration::from_secs(5), || exec.failed_count() == 2));

    // the worker survived and keeps taking work
    let (tx, rx) = unbounded();
    exec.execute_render(2, move |n: &mut u32| {
        *n += 1;
        let _ = tx.send(*n);
        Ok(())
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
}

#[test]
fn worker_context_is_built_per_worker() {
    let exec = SharedTerrainExecutor::with_workers(3, |i| i).unwrap();
    let (tx, rx) = unbounded();
    for _ in 0..30 {
        let tx = tx.clone();
        exec.execute_server(move |id: &mut usize| {
            let _ = tx.send(*id);
            Ok(())
        });
    }
    for _ in 0..30 {
        let id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // worker 0 only serves the render lane
        assert!(id == 1 || id == 2);
    }
}

struct SolidCube;

impl RegionMesher for SolidCube {
    fn build(&self, _origin: RegionOrigin, out: &mut BuildBuffers) -> Result<(), TaskError> {
        out.solid.extend_from_slice(&[0u8; 28 * 4]);
        out.occluders.push(PackedBox::FULL_BOX);
        out.bounds = Some(PackedBox::FULL_BOX);
        Ok(())
    }
}

/// Requests a newer build of the same region while the first one runs.
struct InterruptedOnce {
    slot: Arc<ProtoRegionSlot>,
    fired: AtomicBool,
}

impl RegionMesher for InterruptedOnce {
    fn build(&self, origin: RegionOrigin, out: &mut BuildBuffers) -> Result<(), TaskError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.slot.enqueue(2);
        }
        SolidCube.build(origin, out)
    }
}

fn job(slot: &Arc<ProtoRegionSlot>) -> RegionBuildJob {
    RegionBuildJob {
        origin: RegionOrigin::from_chunk(1, 0, 1),
        slot: Arc::clone(slot),
        camera: [0.0; 3],
        resort_source: None,
        source_ticket: 0,
    }
}

#[test]
fn completed_build_is_published() {
    let slot = Arc::new(ProtoRegionSlot::new());
    let pool = BuildBufferPool::with_capacity_from_workers(1);
    let (tx, rx) = unbounded();
    slot.enqueue(1);
    run_region_build(job(&slot), &SolidCube, &pool, &tx).unwrap();
    match rx.try_recv().unwrap() {
        RegionBuildOutput::Built { ticket, buffers, .. } => {
            assert_eq!(ticket, 1);
            assert_eq!(buffers.occluders.len(), 1);
            assert_eq!(pool.in_use(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(pool.in_use(), 0);
    assert!(slot.is_idle());
}

#[test]
fn superseded_build_is_discarded() {
    let slot = Arc::new(ProtoRegionSlot::new());
    let mesher = InterruptedOnce {
        slot: Arc::clone(&slot),
        fired: AtomicBool::new(false),
    };
    let pool = BuildBufferPool::with_capacity_from_workers(1);
    let (tx, rx) = unbounded();

    slot.enqueue(1);
    run_region_build(job(&slot), &mesher, &pool, &tx).unwrap();
    assert!(rx.try_recv().is_err());
    assert_eq!(pool.in_use(), 0);

    // the follow-up task picks up the newer request
    run_region_build(job(&slot), &mesher, &pool, &tx).unwrap();
    match rx.try_recv().unwrap() {
        RegionBuildOutput::Built { ticket, .. } => assert_eq!(ticket, 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn closed_region_build_is_discarded() {
    let slot = Arc::new(ProtoRegionSlot::new());
    let pool = BuildBufferPool::with_capacity_from_workers(1);
    let (tx, rx) = unbounded();
    slot.enqueue(1);
    slot.invalidate();
    run_region_build(job(&slot), &SolidCube, &pool, &tx).unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn exhausted_buffers_abandon_the_build() {
    let slot = Arc::new(ProtoRegionSlot::new());
    let pool = Arc::new(BuildBufferPool::with_retry(1, Duration::from_millis(1), 2));
    let held = pool.acquire().unwrap();
    let (tx, rx) = unbounded();

    slot.enqueue(7);
    run_region_build(job(&slot), &SolidCube, &pool, &tx).unwrap();
    match rx.try_recv().unwrap() {
        RegionBuildOutput::Abandoned { ticket, reason, .. } => {
            assert_eq!(ticket, 7);
            assert_eq!(reason, TaskError::ResourcesExhausted { attempts: 2 });
        }
        other => panic!("unexpected {:?}", other),
    }
    // the region can be requested again
    assert!(slot.is_idle());
    drop(held);
}

struct BrokenMesher;

impl RegionMesher for BrokenMesher {
    fn build(&self, _origin: RegionOrigin, _out: &mut BuildBuffers) -> Result<(), TaskError> {
        Err(TaskError::Mesher("unknown block".into()))
    }
}

#[test]
fn failed_mesher_abandons_and_reports() {
    let slot = Arc::new(ProtoRegionSlot::new());
    let pool = BuildBufferPool::with_capacity_from_workers(1);
    let (tx, rx) = unbounded();

    slot.enqueue(4);
    let err = run_region_build(job(&slot), &BrokenMesher, &pool, &tx).unwrap_err();
    assert_eq!(err, TaskError::Mesher("unknown block".into()));
    match rx.try_recv().unwrap() {
        RegionBuildOutput::Abandoned { ticket, reason, .. } => {
            assert_eq!(ticket, 4);
            assert_eq!(reason, err);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(slot.is_idle());
    assert_eq!(pool.in_use(), 0);
    assert_eq!(slot.enqueue(5), vista_runtime::EnqueueOutcome::Schedule);
}

#[test]
fn resort_reorders_existing_quads() {
    let slot = Arc::new(ProtoRegionSlot::new());
    let pool = BuildBufferPool::with_capacity_from_workers(1);
    let (tx, rx) = unbounded();

    let mut translucent = Vec::new();
    for z in [2.0f32, 12.0] {
        for _ in 0..4 {
            for c in [0.0f32, 0.0, z] {
                translucent.extend_from_slice(&c.to_le_bytes());
            }
            translucent.extend_from_slice(&[0u8; 16]);
        }
    }
    assert_eq!(slot.enqueue_resort(), vista_runtime::EnqueueOutcome::Schedule);
    let mut j = job(&slot);
    j.resort_source = Some(translucent);
    j.source_ticket = 3;
    run_region_build(j, &SolidCube, &pool, &tx).unwrap();
    match rx.try_recv().unwrap() {
        RegionBuildOutput::Resorted {
            translucent,
            source_ticket,
            ..
        } => {
            assert_eq!(source_ticket, 3);
            let z0 = f32::from_le_bytes(translucent[8..12].try_into().unwrap());
            assert_eq!(z0, 12.0);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(pool.in_use(), 0);
}
