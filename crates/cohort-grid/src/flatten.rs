use std::sync::Arc;

use log::debug;

use cohort_core::capability::{BulkExecutor, Capability, CapabilitySet};
use cohort_core::error::{Error, Result};
use cohort_core::future::Future;
use cohort_core::shape::{GridPoint, GridShape};

use crate::executor::GridExecutor;

// FlattenedExecutor — One-level logical shape atop the grid executor
//
// Exposes a flat index space of `n` lanes by computing a partition of the
// underlying two-level shape and translating indices:
//
//   flat = outer_rank * inner_size + inner_rank
//
// Partition: inner size is fixed to the maximum inner extent the device
// reports for the lane function (groups as large as possible); outer size is
// ceil(n / inner_size). If that outer size exceeds the reported maximum
// outer extent the operation fails outright — there is no fallback to a
// smaller inner size or to multiple launches.
//
// Because outer*inner may exceed `n`, some lanes are over-provisioned: their
// flat index lands at or past `n`. They are hardware-scheduled members of
// their group all the same, so they fully participate in the group's shared
// parameter lifecycle and barriers; they only skip the caller's body.

/// Adapts a [`GridExecutor`] to a flat logical index space.
#[derive(Debug, Clone)]
pub struct FlattenedExecutor {
    base: GridExecutor,
}

impl FlattenedExecutor {
    pub fn new(base: GridExecutor) -> Self {
        FlattenedExecutor { base }
    }

    pub fn base(&self) -> &GridExecutor {
        &self.base
    }

    /// Compute the (outer size, inner size) partition for `n` lanes of `f`.
    pub fn partition<F>(&self, f: &F, n: usize) -> Result<GridShape> {
        let max = self.base.max_shape(f)?;

        // Make the inner groups as large as possible.
        let inner_size = max.inner.len();
        if inner_size == 0 {
            return Err(Error::Configuration {
                needed: n,
                available: 0,
            });
        }
        let outer_size = n.div_ceil(inner_size);
        if outer_size > max.outer.len() {
            return Err(Error::Configuration {
                needed: outer_size,
                available: max.outer.len(),
            });
        }

        let partition = GridShape::new(outer_size as u32, inner_size as u32);
        debug!("partitioned {n} lanes into {partition}");
        Ok(partition)
    }

    /// Launch `f` over the flat space `[0, n)`.
    pub fn bulk_async<F>(&self, f: F, n: usize) -> Result<Future<()>>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let partition = self.partition(&f, n)?;
        self.base.bulk_async(
            move |idx: GridPoint| {
                let flat = partition.flatten(idx);
                if flat < n {
                    f(flat);
                }
            },
            partition,
        )
    }

    /// Launch `f` over `[0, n)` with an outer shared argument.
    pub fn bulk_async_shared<F, O>(&self, f: F, n: usize, outer_init: O) -> Result<Future<()>>
    where
        F: Fn(usize, &O) + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let partition = self.partition(&f, n)?;
        self.base.bulk_async_outer(
            move |idx: GridPoint, outer: &O| {
                let flat = partition.flatten(idx);
                if flat < n {
                    f(flat, outer);
                }
            },
            partition,
            outer_init,
        )
    }

    /// Run `f` over `[0, n)`, blocking until the device drains.
    pub fn bulk_invoke<F>(&self, f: F, n: usize) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let partition = self.partition(&f, n)?;
        self.base.bulk_invoke(
            move |idx: GridPoint| {
                let flat = partition.flatten(idx);
                if flat < n {
                    f(flat);
                }
            },
            partition,
        )
    }

    /// Run `f` over `[0, n)` with an outer shared argument, blocking until
    /// the device drains.
    pub fn bulk_invoke_shared<F, O>(&self, f: F, n: usize, outer_init: O) -> Result<()>
    where
        F: Fn(usize, &O) + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let partition = self.partition(&f, n)?;
        self.base.bulk_invoke_outer(
            move |idx: GridPoint, outer: &O| {
                let flat = partition.flatten(idx);
                if flat < n {
                    f(flat, outer);
                }
            },
            partition,
            outer_init,
        )
    }
}

// The bridge into the uniform flat contract: higher-level algorithms can
// dispatch on a FlattenedExecutor exactly as on a host executor. The result
// object is allocated host-side, shared with the lanes for the duration of
// the launch, and recovered when the completion future resolves.

impl BulkExecutor for FlattenedExecutor {
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
        let holder = Arc::new((result_factory(n), shared_factory(n)));
        let lanes = holder.clone();
        let launched = self.bulk_async(
            move |flat| {
                let (result, shared) = &*lanes;
                f(flat, result, shared);
            },
            n,
        );
        match launched {
            Ok(future) => future.then(move |resolution| {
                resolution?;
                match Arc::try_unwrap(holder) {
                    Ok((result, _shared)) => Ok(result),
                    Err(_) => Err(Error::msg("bulk result still shared after completion")),
                }
            }),
            Err(e) => Future::err(e),
        }
    }
}
