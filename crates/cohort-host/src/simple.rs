use std::panic::{catch_unwind, AssertUnwindSafe};

use log::trace;

use cohort_core::capability::{BulkExecutor, Capability, CapabilitySet};
use cohort_core::error::{Error, Result};
use cohort_core::future::Future;

// Simple executors — Sequential loop, optionally on a background task
//
// The minimal-capability executors. `SynchronousExecutor` runs every lane in
// a single sequential loop on the calling context; `AsynchronousExecutor`
// runs the identical loop on one background pool task and returns a future.
// They serve as synthesis sources for missing capabilities and as baselines
// the continuation executor is tested against.
//
// A panicking lane aborts the remaining lanes (the loop is sequential) and
// surfaces as `Error::Lane` — directly from `bulk_execute`, or at
// `wait`/`get` on the asynchronous future.

fn run_lanes<F, R, S, RF, SF>(f: F, n: usize, result_factory: RF, shared_factory: SF) -> Result<R>
where
    F: Fn(usize, &R, &S),
    RF: FnOnce(usize) -> R,
    SF: FnOnce(usize) -> S,
{
    match catch_unwind(AssertUnwindSafe(|| {
        let result = result_factory(n);
        let shared = shared_factory(n);
        for i in 0..n {
            f(i, &result, &shared);
        }
        result
    })) {
        Ok(result) => Ok(result),
        Err(payload) => Err(Error::from_panic(payload)),
    }
}

/// Runs every lane in a sequential loop on the calling context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynchronousExecutor;

impl SynchronousExecutor {
    pub fn new() -> Self {
        SynchronousExecutor
    }
}

impl BulkExecutor for SynchronousExecutor {
    fn capabilities(&self) -> CapabilitySet {
        Capability::Synchronous.into()
    }

    fn bulk_execute<F, R, S, RF, SF>(
        &self,
        f: F,
        n: usize,
        result_factory: RF,
        shared_factory: SF,
    ) -> Result<R>
    where
        F: Fn(usize, &R, &S) + Send + Sync + 'static,
        R: Send + Sync + 'static,
        S: Send + Sync + 'static,
        RF: FnOnce(usize) -> R + Send + 'static,
        SF: FnOnce(usize) -> S + Send + 'static,
    {
        trace!("synchronous bulk_execute over {n} lanes");
        run_lanes(f, n, result_factory, shared_factory)
    }
}

/// Runs every lane in a sequential loop on one background pool task.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsynchronousExecutor;

impl AsynchronousExecutor {
    pub fn new() -> Self {
        AsynchronousExecutor
    }
}

impl BulkExecutor for AsynchronousExecutor {
    fn capabilities(&self) -> CapabilitySet {
        Capability::Asynchronous.into()
    }

    fn bulk_async_execute<F, R, S, RF, SF>(
        &self,
        f: F,
        n: usize,
        result_factory: RF,
        shared_factory: SF,
    ) -> Future<R>
    where
        F: Fn(usize, &R, &S) + Send + Sync + 'static,
        R: Send + Sync + 'static,
        S: Send + Sync + 'static,
        RF: FnOnce(usize) -> R + Send + 'static,
        SF: FnOnce(usize) -> S + Send + 'static,
    {
        trace!("asynchronous bulk_execute over {n} lanes on a background task");
        let (promise, future) = Future::pair();
        rayon::spawn(move || {
            promise.complete(run_lanes(f, n, result_factory, shared_factory));
        });
        future
    }
}
