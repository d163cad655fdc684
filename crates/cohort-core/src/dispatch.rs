use log::debug;

use crate::capability::{BulkExecutor, Capability};
use crate::error::Result;
use crate::future::Future;

// Dispatch — Engine operations with capability lowering
//
// Callers request an operation here rather than on the executor directly.
// A native implementation is always preferred; an operation the executor
// lacks is synthesized from whichever capability is present:
//
//   Synchronous  from Asynchronous: launch, then block on the future.
//   Asynchronous from Synchronous:  run the synchronous form on a
//                                   background task, resolve a promise.
//   Continuation from Sync/Async:   a background task waits on the
//                                   predecessor, then runs normally.
//
// An executor with an empty capability set yields `Error::Unsupported`.

/// Run `f` over `[0, n)` and return the aggregated result, through the
/// executor's best available capability.
pub fn bulk_execute<E, F, R, S, RF, SF>(
    executor: &E,
    f: F,
    n: usize,
    result_factory: RF,
    shared_factory: SF,
) -> Result<R>
where
    E: BulkExecutor,
    F: Fn(usize, &R, &S) + Send + Sync + 'static,
    R: Send + Sync + 'static,
    S: Send + Sync + 'static,
    RF: FnOnce(usize) -> R + Send + 'static,
    SF: FnOnce(usize) -> S + Send + 'static,
{
    let caps = executor.capabilities();
    if caps.contains(Capability::Synchronous) {
        executor.bulk_execute(f, n, result_factory, shared_factory)
    } else if caps.contains(Capability::Asynchronous) {
        debug!("bulk_execute: synthesizing from asynchronous capability");
        executor
            .bulk_async_execute(f, n, result_factory, shared_factory)
            .get()
    } else {
        debug!("bulk_execute: synthesizing from continuation capability");
        executor
            .bulk_then_execute(
                move |i, _: &(), result: &R, shared: &S| f(i, result, shared),
                n,
                Future::ready(()),
                result_factory,
                shared_factory,
            )
            .get()
    }
}

/// Run `f` over `[0, n)` on a background task, through the executor's best
/// available capability. Errors travel through the returned future.
pub fn bulk_async_execute<E, F, R, S, RF, SF>(
    executor: &E,
    f: F,
    n: usize,
    result_factory: RF,
    shared_factory: SF,
) -> Future<R>
where
    E: BulkExecutor,
    F: Fn(usize, &R, &S) + Send + Sync + 'static,
    R: Send + Sync + 'static,
    S: Send + Sync + 'static,
    RF: FnOnce(usize) -> R + Send + 'static,
    SF: FnOnce(usize) -> S + Send + 'static,
{
    let caps = executor.capabilities();
    if caps.contains(Capability::Asynchronous) {
        executor.bulk_async_execute(f, n, result_factory, shared_factory)
    } else if caps.contains(Capability::Synchronous) {
        debug!("bulk_async_execute: synthesizing from synchronous capability");
        let executor = executor.clone();
        let (promise, future) = Future::pair();
        rayon::spawn(move || {
            promise.complete(executor.bulk_execute(f, n, result_factory, shared_factory));
        });
        future
    } else {
        debug!("bulk_async_execute: synthesizing from continuation capability");
        executor.bulk_then_execute(
            move |i, _: &(), result: &R, shared: &S| f(i, result, shared),
            n,
            Future::ready(()),
            result_factory,
            shared_factory,
        )
    }
}

/// Once `predecessor` resolves, run `f` over `[0, n)`, through the
/// executor's best available capability. Errors travel through the returned
/// future.
pub fn bulk_then_execute<E, T, F, R, S, RF, SF>(
    executor: &E,
    f: F,
    n: usize,
    predecessor: Future<T>,
    result_factory: RF,
    shared_factory: SF,
) -> Future<R>
where
    E: BulkExecutor,
    T: Send + Sync + 'static,
    F: Fn(usize, &T, &R, &S) + Send + Sync + 'static,
    R: Send + Sync + 'static,
    S: Send + Sync + 'static,
    RF: FnOnce(usize) -> R + Send + 'static,
    SF: FnOnce(usize) -> S + Send + 'static,
{
    let caps = executor.capabilities();
    if caps.contains(Capability::Continuation) {
        return executor.bulk_then_execute(f, n, predecessor, result_factory, shared_factory);
    }

    debug!("bulk_then_execute: synthesizing by waiting on the predecessor");
    let executor = executor.clone();
    let (promise, future) = Future::pair();
    rayon::spawn(move || {
        let value = match predecessor.get() {
            Ok(value) => value,
            Err(e) => {
                promise.complete(Err(e));
                return;
            }
        };
        let g = move |i: usize, result: &R, shared: &S| f(i, &value, result, shared);
        let outcome = if executor.capabilities().contains(Capability::Synchronous) {
            executor.bulk_execute(g, n, result_factory, shared_factory)
        } else {
            executor
                .bulk_async_execute(g, n, result_factory, shared_factory)
                .get()
        };
        promise.complete(outcome);
    });
    future
}
