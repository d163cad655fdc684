//! # cohort-host
//!
//! Host executors for the cohort bulk execution engine.
//!
//! Three executors cover the three capabilities on the host side:
//! - [`SynchronousExecutor`] — one sequential loop on the calling context
//! - [`AsynchronousExecutor`] — the same loop on one background pool task
//! - [`ContinuationExecutor`] — recursive fork-join over a predecessor
//!   future's value, on the work-stealing pool
//!
//! Each natively implements exactly one operation of the
//! [`BulkExecutor`](cohort_core::BulkExecutor) contract; the
//! [`dispatch`](cohort_core::dispatch) module synthesizes the rest.

pub mod continuation;
pub mod simple;

pub use continuation::ContinuationExecutor;
pub use simple::{AsynchronousExecutor, SynchronousExecutor};
