// Flattening adapter tests — Partition computation, flat index
// translation, over-provisioned lanes, and the bridge into the uniform
// bulk contract.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cohort_core::capability::{BulkExecutor, Capability};
use cohort_core::dispatch;
use cohort_core::error::Error;
use cohort_core::shape::Extent;
use cohort_grid::{DeviceLimits, FlattenedExecutor, GridExecutor, VirtualDevice};

// Devices with a group size of 4 keep the partition arithmetic visible.

fn narrow_device(ordinal: usize, max_groups: u32) -> FlattenedExecutor {
    let device = VirtualDevice::open_with(
        ordinal,
        DeviceLimits {
            max_outer: Extent::d1(max_groups),
            max_inner: Extent::d1(4),
            max_lanes_per_group: 4,
        },
    )
    .unwrap();
    FlattenedExecutor::new(GridExecutor::new(device))
}

#[test]
fn test_partition_rounds_up() {
    let ex = narrow_device(40, 1000);
    let lane_fn = |_i: usize| {};

    let partition = ex.partition(&lane_fn, 7).unwrap();
    assert_eq!(partition.group_count(), 2);
    assert_eq!(partition.group_size(), 4);

    let exact = ex.partition(&lane_fn, 8).unwrap();
    assert_eq!(exact.group_count(), 2);

    let empty = ex.partition(&lane_fn, 0).unwrap();
    assert_eq!(empty.group_count(), 0);
}

#[test]
fn test_partition_capacity_is_a_hard_error() {
    let ex = narrow_device(41, 2);
    let lane_fn = |_i: usize| {};
    match ex.partition(&lane_fn, 9) {
        Err(Error::Configuration { needed, available }) => {
            assert_eq!(needed, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected Error::Configuration, got {other:?}"),
    }
}

#[test]
fn test_flat_translation_is_unique_and_invertible() {
    let ex = narrow_device(42, 1000);
    let lane_fn = |_i: usize| {};

    for n in [1usize, 4, 7, 16, 33] {
        let partition = ex.partition(&lane_fn, n).unwrap();
        let mut seen = HashSet::new();
        for outer in partition.outer.points() {
            for inner in partition.inner.points() {
                let point = cohort_core::shape::GridPoint { outer, inner };
                let flat = partition.flatten(point);
                assert!(seen.insert(flat), "flat index {flat} duplicated");
                assert_eq!(partition.unflatten(flat), point);
            }
        }
        // Every logical index is covered...
        for flat in 0..n {
            assert!(seen.contains(&flat));
        }
        // ...and only whole groups beyond it are provisioned.
        assert_eq!(seen.len(), partition.lane_count());
        assert!(partition.lane_count() >= n);
    }
}

#[test]
fn test_overprovisioned_lanes_skip_the_body() {
    // n = 7 over groups of 4: lane (outer 1, inner 3) holds flat index 7
    // and must not run the body.
    let ex = narrow_device(43, 1000);
    let executed: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));

    ex.bulk_invoke_shared(
        |flat, executed: &Arc<Mutex<HashSet<usize>>>| {
            assert!(executed.lock().unwrap().insert(flat), "lane {flat} ran twice");
        },
        7,
        executed.clone(),
    )
    .unwrap();

    let executed = executed.lock().unwrap();
    assert_eq!(executed.len(), 7);
    assert!((0..7).all(|flat| executed.contains(&flat)));
    assert!(!executed.contains(&7));
}

#[test]
fn test_flat_async_covers_every_lane() {
    let ex = narrow_device(44, 1000);
    let counted = Arc::new(AtomicUsize::new(0));
    let counted2 = counted.clone();
    let future = ex
        .bulk_async(
            move |_flat| {
                counted2.fetch_add(1, Ordering::SeqCst);
            },
            33,
        )
        .unwrap();
    future.get().unwrap();
    assert_eq!(counted.load(Ordering::SeqCst), 33);
}

#[test]
fn test_zero_lanes_launches_nothing() {
    let ex = narrow_device(45, 1000);
    let touched = Arc::new(AtomicUsize::new(0));
    let touched2 = touched.clone();
    ex.bulk_invoke(
        move |_flat| {
            touched2.fetch_add(1, Ordering::SeqCst);
        },
        0,
    )
    .unwrap();
    assert_eq!(touched.load(Ordering::SeqCst), 0);
}

// The bridge: a FlattenedExecutor is an asynchronous BulkExecutor, so the
// capability-lowering dispatch can drive it like any host executor.

#[test]
fn test_bridge_reports_asynchronous_capability() {
    let ex = narrow_device(46, 1000);
    assert!(ex.capabilities().contains(Capability::Asynchronous));
    assert!(!ex.capabilities().contains(Capability::Synchronous));
}

#[test]
fn test_bridge_recovers_result_at_resolution() {
    let ex = narrow_device(47, 1000);
    let n = 10usize;
    let result = ex
        .bulk_async_execute(
            |i, result: &Vec<AtomicUsize>, shared: &usize| {
                result[i].store(i + shared, Ordering::SeqCst);
            },
            n,
            |n| (0..n).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>(),
            |_| 100usize,
        )
        .get()
        .unwrap();
    let values: Vec<usize> = result.iter().map(|v| v.load(Ordering::SeqCst)).collect();
    let expected: Vec<usize> = (0..n).map(|i| i + 100).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_bridge_through_dispatch() {
    let ex = narrow_device(48, 1000);
    let result = dispatch::bulk_execute(
        &ex,
        |i, result: &Vec<AtomicUsize>, _shared: &()| {
            result[i].store(i * 3, Ordering::SeqCst);
        },
        9,
        |n| (0..n).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>(),
        |_| (),
    )
    .unwrap();
    let values: Vec<usize> = result.iter().map(|v| v.load(Ordering::SeqCst)).collect();
    assert_eq!(values, vec![0, 3, 6, 9, 12, 15, 18, 21, 24]);
}

#[test]
fn test_bridge_partition_failure_travels_through_future() {
    let ex = narrow_device(49, 2);
    let err = ex
        .bulk_async_execute(
            |_i, _result: &(), _shared: &()| {},
            100,
            |_| (),
            |_| (),
        )
        .get()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}
