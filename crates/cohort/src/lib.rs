//! # Cohort
//!
//! A bulk execution engine: one logical function dispatched over an index
//! space of lanes, across heterogeneous execution resources, behind one
//! contract.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `cohort-core` | Shape/Index model, Future/Promise, capability set, `BulkExecutor` contract, lowering dispatch |
//! | `cohort-host` | Host executors: sequential, background-task, fork-join continuation |
//! | `cohort-grid` | Virtual grid device, two-level grid executor, flattening adapter |
//!
//! ## Usage
//!
//! ```no_run
//! use cohort::{bulk_invoke, GridExecutor, Shape, VirtualDevice};
//!
//! let device = VirtualDevice::open(0);
//! let executor = GridExecutor::new(device);
//!
//! // 100 lanes over a flat logical space, partitioned onto the grid.
//! bulk_invoke(&executor, Shape::Flat(100), |idx| {
//!     let _ = idx;
//! })
//! .unwrap();
//! ```

pub use cohort_core::{
    dispatch, BulkExecutor, Capability, CapabilitySet, Error, Extent, Future, GridPoint,
    GridShape, Index, Point, Promise, Result, Shape,
};

pub use cohort_host::{AsynchronousExecutor, ContinuationExecutor, SynchronousExecutor};

pub use cohort_grid::{
    current_device, device, set_current_device, DeviceLimits, FlattenedExecutor, GridExecutor,
    LaneCtx, Stream, VirtualDevice,
};

/// Engine entry points: `bulk_invoke` / `bulk_async` and their `_shared`
/// variants.
pub mod bulk;

/// Algorithms built atop the engine (element-wise copy).
pub mod algorithm;

pub use bulk::{bulk_async, bulk_async_shared, bulk_invoke, bulk_invoke_shared};
