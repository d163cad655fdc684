// Grid executor tests — Launch coverage, shared-parameter lifecycle,
// device faults, and the max_shape device dance.
//
// Each test that mutates device-global state (faults, current device) uses
// its own ordinal so tests stay independent under parallel execution.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cohort_core::error::Error;
use cohort_core::shape::{Extent, GridPoint, GridShape};
use cohort_grid::{current_device, set_current_device, DeviceLimits, GridExecutor, VirtualDevice};

fn executor(ordinal: usize) -> GridExecutor {
    GridExecutor::new(VirtualDevice::open(ordinal))
}

// Helper: an inner shared value that counts its clones and drops.

#[derive(Debug)]
struct Probe {
    constructs: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
    value: usize,
}

impl Probe {
    fn new(constructs: &Arc<AtomicUsize>, drops: &Arc<AtomicUsize>, value: usize) -> Self {
        Probe {
            constructs: constructs.clone(),
            drops: drops.clone(),
            value,
        }
    }
}

impl Clone for Probe {
    fn clone(&self) -> Self {
        self.constructs.fetch_add(1, Ordering::SeqCst);
        Probe {
            constructs: self.constructs.clone(),
            drops: self.drops.clone(),
            value: self.value,
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_every_lane_runs_once_with_its_identity() {
    let ex = executor(0);
    let shape = GridShape::new(Extent::d2(2, 2), Extent::d2(4, 2));
    let seen: Arc<Mutex<HashSet<GridPoint>>> = Arc::new(Mutex::new(HashSet::new()));

    ex.bulk_invoke_outer(
        move |idx: GridPoint, seen: &Arc<Mutex<HashSet<GridPoint>>>| {
            assert!(shape.outer.contains(idx.outer));
            assert!(shape.inner.contains(idx.inner));
            assert!(seen.lock().unwrap().insert(idx), "lane {idx} ran twice");
        },
        shape,
        seen.clone(),
    )
    .unwrap();

    assert_eq!(seen.lock().unwrap().len(), shape.lane_count());
}

#[test]
fn test_inner_shared_constructed_once_per_group() {
    let ex = executor(0);
    let constructs = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let shape = GridShape::new(3u32, 4u32);

    ex.bulk_invoke_inner(
        |_idx: GridPoint, inner: &Probe| {
            // Every lane observes the fully constructed value.
            assert_eq!(inner.value, 42);
        },
        shape,
        Probe::new(&constructs, &drops, 42),
    )
    .unwrap();

    // One clone per group; the per-group instances are destroyed by their
    // groups and the initializer itself drops with the launch.
    assert_eq!(constructs.load(Ordering::SeqCst), 3);
    assert_eq!(drops.load(Ordering::SeqCst), 4);
}

#[test]
fn test_group_lifecycle_includes_overprovisioned_groups() {
    // 3 groups of 4 lanes over a logical extent of 7: group 2 consists
    // entirely of over-provisioned lanes yet still runs its lifecycle.
    let ex = executor(0);
    let constructs = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let shape = GridShape::new(3u32, 4u32);
    let n = 7usize;

    let executed: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));
    ex.bulk_invoke_shared(
        move |idx: GridPoint, executed: &Arc<Mutex<HashSet<usize>>>, inner: &Probe| {
            assert_eq!(inner.value, 9);
            let flat = shape.flatten(idx);
            if flat < n {
                assert!(executed.lock().unwrap().insert(flat));
            }
        },
        shape,
        executed.clone(),
        Probe::new(&constructs, &drops, 9),
    )
    .unwrap();

    assert_eq!(constructs.load(Ordering::SeqCst), 3);
    assert_eq!(drops.load(Ordering::SeqCst), 4);
    let executed = executed.lock().unwrap();
    assert_eq!(executed.len(), n);
}

#[test]
fn test_async_completion_via_callback() {
    let ex = executor(0);
    let counted = Arc::new(AtomicUsize::new(0));
    let counted2 = counted.clone();
    let future = ex
        .bulk_async(
            move |_idx: GridPoint| {
                counted2.fetch_add(1, Ordering::SeqCst);
            },
            GridShape::new(4u32, 8u32),
        )
        .unwrap();
    future.get().unwrap();
    // The future resolves only after every lane completed.
    assert_eq!(counted.load(Ordering::SeqCst), 32);
}

#[test]
fn test_outer_shared_released_at_resolution() {
    let ex = executor(0);
    let drops = Arc::new(AtomicUsize::new(0));
    let outer_drops = drops.clone();

    struct Outer(Arc<AtomicUsize>);
    impl Drop for Outer {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let future = ex
        .bulk_async_outer(
            |_idx: GridPoint, _outer: &Outer| {},
            GridShape::new(2u32, 4u32),
            Outer(outer_drops),
        )
        .unwrap();
    future.get().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_device_fault_surfaces_at_synchronize_not_future() {
    let device = VirtualDevice::open(20);
    let ex = GridExecutor::new(device.clone());
    let future = ex
        .bulk_async(
            |idx: GridPoint| {
                if idx.inner.x() == 2 {
                    panic!("lane fault on device");
                }
            },
            GridShape::new(1u32, 4u32),
        )
        .unwrap();

    // The future's value channel stays clean.
    future.get().unwrap();

    // The fault is waiting at the next host-side check, exactly once.
    match device.synchronize() {
        Err(Error::DeviceFault(message)) => assert!(message.contains("lane fault")),
        other => panic!("expected DeviceFault, got {other:?}"),
    }
    device.synchronize().unwrap();
}

#[test]
fn test_bulk_invoke_reports_fault() {
    let ex = executor(21);
    let err = ex
        .bulk_invoke(
            |_idx: GridPoint| panic!("synchronous lane fault"),
            GridShape::new(1u32, 2u32),
        )
        .unwrap_err();
    assert!(matches!(err, Error::DeviceFault(_)));
}

#[test]
fn test_body_panic_keeps_group_barrier_discipline() {
    // One lane's body panics between the construct and destroy barriers;
    // the group must still construct once, destroy once, and terminate.
    let device = VirtualDevice::open(22);
    let ex = GridExecutor::new(device.clone());
    let constructs = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));

    ex.bulk_invoke_inner(
        |idx: GridPoint, _inner: &Probe| {
            if idx.inner.x() == 1 {
                panic!("body fault");
            }
        },
        GridShape::new(2u32, 4u32),
        Probe::new(&constructs, &drops, 0),
    )
    .unwrap_err();

    assert_eq!(constructs.load(Ordering::SeqCst), 2);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

#[test]
fn test_launch_rejected_beyond_limits() {
    let device = VirtualDevice::open_with(
        23,
        DeviceLimits {
            max_outer: Extent::d1(8),
            max_inner: Extent::d1(4),
            max_lanes_per_group: 4,
        },
    )
    .unwrap();
    let ex = GridExecutor::new(device);

    let err = ex
        .bulk_invoke(|_idx: GridPoint| {}, GridShape::new(2u32, 16u32))
        .unwrap_err();
    match err {
        Error::Launch { op, code, .. } => {
            assert_eq!(op, "launch");
            assert_eq!(code, 9);
        }
        other => panic!("expected Error::Launch, got {other:?}"),
    }
}

// One test covers the whole max_shape dance: other tests in this binary
// must not assert on the global current device, since queries switch it
// transiently.
#[test]
fn test_max_shape_queries_and_restores_current_device() {
    VirtualDevice::open(0);
    let device = VirtualDevice::open_with(
        24,
        DeviceLimits {
            max_outer: Extent::d1(100),
            max_inner: Extent::d1(8),
            max_lanes_per_group: 8,
        },
    )
    .unwrap();
    let ex = GridExecutor::new(device);

    set_current_device(0).unwrap();
    let lane_fn = |_idx: GridPoint| {};
    let max = ex.max_shape(&lane_fn).unwrap();

    // The limits of device 24, queried through the switch...
    assert_eq!(max.outer.len(), 100);
    assert_eq!(max.inner.len(), 8);
    // ...and the prior current device restored afterwards.
    assert_eq!(current_device(), 0);
}
