use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;

use cohort_core::error::Result;
use cohort_core::future::Future;
use cohort_core::shape::{Extent, GridPoint, GridShape};

use crate::device::{
    current_device, device, set_current_device, LaneCtx, Stream, VirtualDevice, DEVICE_QUERY_LOCK,
};
use crate::shared::GroupSlots;

// GridExecutor — Two-level hardware dispatch
//
// Issues exactly one device launch per bulk operation, sized by a GridShape;
// each lane recovers its (outer, inner) identity from the device-provided
// coordinates. Four variants each of bulk_invoke/bulk_async cover the
// shared-argument combinations, and each elides the marshalling paths it
// does not need: a launch without an inner shared argument allocates no
// per-group slots and synchronizes no barriers, a launch without an outer
// shared argument heap-allocates nothing.
//
// Shared-argument marshalling:
//   - outer: heap-allocated once before the launch, captured by every lane,
//     released by a completion continuation on the returned future (or after
//     the synchronous drain).
//   - inner: a per-group uninitialized slot, constructed by the group's
//     first lane from a clone of the initializer and destroyed by that same
//     lane; a barrier orders construction before any use and a second
//     barrier orders every use before destruction. A panicking body is held
//     until after the second barrier so the group's barrier discipline
//     survives, then re-raised to the device's fault path.
//
// Asynchronous completion is observed through a stream callback resolving a
// future; synchronous invocation instead blocks by draining the device.

/// Dispatches bulk operations as single two-level launches on a device.
#[derive(Debug, Clone)]
pub struct GridExecutor {
    device: VirtualDevice,
    stream: Stream,
}

impl GridExecutor {
    /// An executor on the device's default stream.
    pub fn new(device: VirtualDevice) -> Self {
        let stream = device.default_stream().clone();
        GridExecutor { device, stream }
    }

    /// An executor on an explicit stream of the same device.
    pub fn with_stream(device: VirtualDevice, stream: Stream) -> Self {
        GridExecutor { device, stream }
    }

    pub fn device(&self) -> &VirtualDevice {
        &self.device
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    // Asynchronous entry points

    /// Launch `f` over `shape`; the future resolves when the device reports
    /// the launch complete.
    pub fn bulk_async<F>(&self, f: F, shape: GridShape) -> Result<Future<()>>
    where
        F: Fn(GridPoint) + Send + Sync + 'static,
    {
        self.launch_async(move |ctx: &LaneCtx| f(ctx.index()), shape)
    }

    /// Launch with an outer shared argument: one instance for the whole
    /// operation, visible to every lane.
    pub fn bulk_async_outer<F, O>(&self, f: F, shape: GridShape, outer_init: O) -> Result<Future<()>>
    where
        F: Fn(GridPoint, &O) + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let outer = Arc::new(outer_init);
        let lane_outer = outer.clone();
        let future =
            self.launch_async(move |ctx: &LaneCtx| f(ctx.index(), &lane_outer), shape)?;
        // The outer allocation is released when the operation resolves.
        Ok(future.then(move |resolution| {
            drop(outer);
            resolution
        }))
    }

    /// Launch with an inner shared argument: one instance per group, built
    /// from a clone of `inner_init` by the group's first lane.
    pub fn bulk_async_inner<F, I>(&self, f: F, shape: GridShape, inner_init: I) -> Result<Future<()>>
    where
        F: Fn(GridPoint, &I) + Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
    {
        self.launch_async(marshal_inner(f, shape, inner_init), shape)
    }

    /// Launch with both shared arguments.
    pub fn bulk_async_shared<F, O, I>(
        &self,
        f: F,
        shape: GridShape,
        outer_init: O,
        inner_init: I,
    ) -> Result<Future<()>>
    where
        F: Fn(GridPoint, &O, &I) + Send + Sync + 'static,
        O: Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
    {
        let outer = Arc::new(outer_init);
        let lane_outer = outer.clone();
        let g = move |idx: GridPoint, inner: &I| f(idx, &lane_outer, inner);
        let future = self.launch_async(marshal_inner(g, shape, inner_init), shape)?;
        Ok(future.then(move |resolution| {
            drop(outer);
            resolution
        }))
    }

    // Synchronous entry points: block by draining the device's outstanding
    // work, then report any recorded fault.

    pub fn bulk_invoke<F>(&self, f: F, shape: GridShape) -> Result<()>
    where
        F: Fn(GridPoint) + Send + Sync + 'static,
    {
        self.device
            .launch(&self.stream, shape, move |ctx: &LaneCtx| f(ctx.index()))?;
        self.device.synchronize()
    }

    pub fn bulk_invoke_outer<F, O>(&self, f: F, shape: GridShape, outer_init: O) -> Result<()>
    where
        F: Fn(GridPoint, &O) + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let outer = Arc::new(outer_init);
        let lane_outer = outer.clone();
        self.device.launch(&self.stream, shape, move |ctx: &LaneCtx| {
            f(ctx.index(), &lane_outer)
        })?;
        self.device.synchronize()
        // `outer` drops here, after every lane has completed.
    }

    pub fn bulk_invoke_inner<F, I>(&self, f: F, shape: GridShape, inner_init: I) -> Result<()>
    where
        F: Fn(GridPoint, &I) + Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
    {
        self.device
            .launch(&self.stream, shape, marshal_inner(f, shape, inner_init))?;
        self.device.synchronize()
    }

    pub fn bulk_invoke_shared<F, O, I>(
        &self,
        f: F,
        shape: GridShape,
        outer_init: O,
        inner_init: I,
    ) -> Result<()>
    where
        F: Fn(GridPoint, &O, &I) + Send + Sync + 'static,
        O: Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
    {
        let outer = Arc::new(outer_init);
        let lane_outer = outer.clone();
        let g = move |idx: GridPoint, inner: &I| f(idx, &lane_outer, inner);
        self.device
            .launch(&self.stream, shape, marshal_inner(g, shape, inner_init))?;
        self.device.synchronize()
    }

    /// The maximum legal shape for launching `f` on this executor's device.
    ///
    /// Mirrors the hardware query sequence: temporarily switches the global
    /// current device to the target, queries, then restores the prior
    /// current device. The sequence is serialized by a global lock because
    /// it mutates process-global state.
    pub fn max_shape<F>(&self, f: &F) -> Result<GridShape> {
        let _guard = DEVICE_QUERY_LOCK
            .lock()
            .expect("device query lock poisoned");

        let prior = current_device();
        let target = self.device.ordinal();
        if prior != target {
            set_current_device(target)?;
        }

        let queried = device(current_device())?;
        let attributes = queried.function_attributes(f);
        let limits = queried.limits();

        if prior != target {
            set_current_device(prior)?;
        }

        let max = GridShape::new(
            Extent::d1(limits.max_outer.dims()[0]),
            Extent::d1(attributes.max_lanes_per_group.min(limits.max_lanes_per_group) as u32),
        );
        debug!("device {target}: max shape {max}");
        Ok(max)
    }

    fn launch_async<K>(&self, kernel: K, shape: GridShape) -> Result<Future<()>>
    where
        K: Fn(&LaneCtx) + Send + Sync + 'static,
    {
        self.device.launch(&self.stream, shape, kernel)?;
        let (promise, future) = Future::pair();
        self.stream.add_callback(move || promise.complete(Ok(())))?;
        Ok(future)
    }
}

/// Wrap `f` in the inner-shared marshalling protocol: construct by the
/// group's first lane, barrier, body, barrier, destroy by the same lane.
fn marshal_inner<F, I>(
    f: F,
    shape: GridShape,
    inner_init: I,
) -> impl Fn(&LaneCtx) + Send + Sync + 'static
where
    F: Fn(GridPoint, &I) + Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
{
    let slots = GroupSlots::new(shape.group_count());
    move |ctx: &LaneCtx| {
        let slot = slots.slot(ctx.outer_rank());

        let construct_panic = if ctx.inner_rank() == 0 {
            catch_unwind(AssertUnwindSafe(|| unsafe {
                slot.construct(inner_init.clone());
            }))
            .err()
        } else {
            None
        };
        ctx.sync_group();

        let body_panic = match unsafe { slot.get() } {
            Some(inner) => catch_unwind(AssertUnwindSafe(|| f(ctx.index(), inner))).err(),
            // Construction failed: the body is skipped, the fault surfaces
            // through the constructing lane's unwind below.
            None => None,
        };
        ctx.sync_group();

        if ctx.inner_rank() == 0 {
            unsafe { slot.destroy() };
        }

        // Re-raise only after barrier discipline is complete, so the other
        // lanes of the group are never left waiting.
        if let Some(payload) = construct_panic.or(body_panic) {
            resume_unwind(payload);
        }
    }
}
