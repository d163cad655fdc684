use cohort_core::error::{Error, Result};
use cohort_core::future::Future;
use cohort_core::shape::{Index, Shape};
use cohort_grid::{FlattenedExecutor, GridExecutor};

// bulk_invoke / bulk_async — The engine's entry points
//
// Higher-level algorithms dispatch through these. A hierarchical shape goes
// straight to the grid executor; a flat shape is routed through the
// flattening adapter, which partitions the logical space and skips the body
// on over-provisioned lanes. The `_shared` variants accept the optional
// (outer_init, inner_init) pair; they require a hierarchical shape, since a
// flat logical space exposes no caller-visible groups to share within.

/// Run `f` over `shape`, blocking until every lane completes.
pub fn bulk_invoke<F>(executor: &GridExecutor, shape: impl Into<Shape>, f: F) -> Result<()>
where
    F: Fn(Index) + Send + Sync + 'static,
{
    match shape.into() {
        Shape::Hierarchical(grid) => {
            executor.bulk_invoke(move |p| f(Index::Hierarchical(p)), grid)
        }
        Shape::Flat(n) => {
            FlattenedExecutor::new(executor.clone()).bulk_invoke(move |i| f(Index::Flat(i)), n)
        }
    }
}

/// Launch `f` over `shape`; the future resolves when the device reports the
/// operation complete.
pub fn bulk_async<F>(
    executor: &GridExecutor,
    shape: impl Into<Shape>,
    f: F,
) -> Result<Future<()>>
where
    F: Fn(Index) + Send + Sync + 'static,
{
    match shape.into() {
        Shape::Hierarchical(grid) => {
            executor.bulk_async(move |p| f(Index::Hierarchical(p)), grid)
        }
        Shape::Flat(n) => {
            FlattenedExecutor::new(executor.clone()).bulk_async(move |i| f(Index::Flat(i)), n)
        }
    }
}

/// Run `f` over a hierarchical `shape` with the shared-parameter pair:
/// `outer_init` once per operation, `inner_init` once per group.
pub fn bulk_invoke_shared<F, O, I>(
    executor: &GridExecutor,
    shape: impl Into<Shape>,
    f: F,
    outer_init: O,
    inner_init: I,
) -> Result<()>
where
    F: Fn(Index, &O, &I) + Send + Sync + 'static,
    O: Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
{
    match shape.into() {
        Shape::Hierarchical(grid) => executor.bulk_invoke_shared(
            move |p, outer: &O, inner: &I| f(Index::Hierarchical(p), outer, inner),
            grid,
            outer_init,
            inner_init,
        ),
        Shape::Flat(n) => Err(flat_shared_error(n)),
    }
}

/// Launch `f` over a hierarchical `shape` with the shared-parameter pair.
pub fn bulk_async_shared<F, O, I>(
    executor: &GridExecutor,
    shape: impl Into<Shape>,
    f: F,
    outer_init: O,
    inner_init: I,
) -> Result<Future<()>>
where
    F: Fn(Index, &O, &I) + Send + Sync + 'static,
    O: Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
{
    match shape.into() {
        Shape::Hierarchical(grid) => executor.bulk_async_shared(
            move |p, outer: &O, inner: &I| f(Index::Hierarchical(p), outer, inner),
            grid,
            outer_init,
            inner_init,
        ),
        Shape::Flat(n) => Err(flat_shared_error(n)),
    }
}

fn flat_shared_error(n: usize) -> Error {
    Error::msg(format!(
        "shared-parameter pair requires a hierarchical shape, got flat shape {n}"
    ))
}
