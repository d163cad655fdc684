//! # cohort-grid
//!
//! The hardware side of the cohort bulk execution engine: a virtual
//! two-level grid device and the executors that dispatch onto it.
//!
//! - [`VirtualDevice`] / [`Stream`] — the device/queue abstraction: a
//!   registry of devices with a global current device, ordered work queues
//!   with completion callbacks, full-queue synchronize, and per-launch lane
//!   threads with a group barrier
//! - [`GridExecutor`] — one launch per bulk operation over a
//!   [`GridShape`](cohort_core::GridShape), with outer/inner shared
//!   argument marshalling
//! - [`FlattenedExecutor`] — a flat logical index space atop the grid
//!   executor, partitioning `n` lanes into groups and skipping the body on
//!   over-provisioned lanes

pub mod device;
pub mod executor;
pub mod flatten;
mod shared;

pub use device::{
    current_device, device, set_current_device, DeviceLimits, FunctionAttributes, LaneCtx, Stream,
    VirtualDevice,
};
pub use executor::GridExecutor;
pub use flatten::FlattenedExecutor;
