//! # cohort-core
//!
//! Core types for the cohort bulk execution engine.
//!
//! This crate provides:
//! - [`Shape`] / [`Index`] — flat and two-level index spaces, with
//!   [`Extent`], [`Point`], [`GridShape`], [`GridPoint`] building blocks
//! - [`Future`] / [`Promise`] — the deferred-result primitive every
//!   asynchronous operation returns
//! - [`Capability`] / [`CapabilitySet`] / [`BulkExecutor`] — the uniform
//!   contract over flat bulk dispatchers
//! - [`dispatch`] — engine operations that prefer an executor's native
//!   capability and synthesize the rest

pub mod capability;
pub mod dispatch;
pub mod error;
pub mod future;
pub mod shape;

pub use capability::{BulkExecutor, Capability, CapabilitySet};
pub use error::{Error, Result};
pub use future::{Future, Promise};
pub use shape::{Extent, GridPoint, GridShape, Index, Point, Shape};
