use std::panic::{catch_unwind, AssertUnwindSafe};

use log::trace;

use cohort_core::capability::{BulkExecutor, Capability, CapabilitySet};
use cohort_core::error::{Error, Result};
use cohort_core::future::Future;

// Continuation executor — Recursive fork-join after a predecessor
//
// `bulk_then_execute` waits for the predecessor future, then partitions
// `[0, n)` by midpoint on the work-stealing pool: each frame spawns
// `[first, mid)` and `[mid+1, last)` as child tasks, runs index `mid` on the
// current context, and joins both children before returning. The recursion
// tree is a balanced binary split of depth log2(n), which bounds fan-out
// and fork overhead while spreading lanes across the pool.
//
// The aggregate result and the shared parameter are created once, on the
// frame that receives the predecessor's value, and passed by reference into
// every recursive lane. Every frame's scope joins its children before the
// frame returns, so the result is moved out only after all lanes finish.

/// Lanes must be run only for non-empty ranges: `first < last`.
fn split<G>(g: &G, first: usize, last: usize)
where
    G: Fn(usize) + Sync,
{
    let mid = first + (last - first) / 2;
    rayon::scope(|s| {
        if first < mid {
            s.spawn(move |_| split(g, first, mid));
        }
        if mid + 1 < last {
            s.spawn(move |_| split(g, mid + 1, last));
        }
        g(mid);
        // Scope exit joins both child tasks before this frame returns.
    });
}

/// Dispatches lanes by recursive fork-join once a predecessor resolves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuationExecutor;

impl ContinuationExecutor {
    pub fn new() -> Self {
        ContinuationExecutor
    }
}

impl BulkExecutor for ContinuationExecutor {
    fn capabilities(&self) -> CapabilitySet {
        Capability::Continuation.into()
    }

    fn bulk_then_execute<T, F, R, S, RF, SF>(
        &self,
        f: F,
        n: usize,
        predecessor: Future<T>,
        result_factory: RF,
        shared_factory: SF,
    ) -> Future<R>
    where
        T: Send + Sync + 'static,
        F: Fn(usize, &T, &R, &S) + Send + Sync + 'static,
        R: Send + Sync + 'static,
        S: Send + Sync + 'static,
        RF: FnOnce(usize) -> R + Send + 'static,
        SF: FnOnce(usize) -> S + Send + 'static,
    {
        if n == 0 {
            // Resolve immediately; no task is spawned.
            return Future::ready(result_factory(0));
        }

        trace!("continuation bulk_execute over {n} lanes");
        let (promise, future) = Future::pair();
        rayon::spawn(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(|| -> Result<R> {
                let value = predecessor.get()?;
                let result = result_factory(n);
                let shared = shared_factory(n);
                let g = |i: usize| f(i, &value, &result, &shared);
                split(&g, 0, n);
                Ok(result)
            })) {
                Ok(outcome) => outcome,
                Err(payload) => Err(Error::from_panic(payload)),
            };
            promise.complete(outcome);
        });
        future
    }
}
