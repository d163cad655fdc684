use std::fmt;

use crate::error::{Error, Result};
use crate::future::Future;

// Capability — What an executor can do natively
//
// Every executor supports some subset of three bulk dispatch operations:
//
//   Synchronous   bulk_execute        run all lanes, return the result
//   Asynchronous  bulk_async_execute  run all lanes on a background task,
//                                     return a future to the result
//   Continuation  bulk_then_execute   run all lanes after a predecessor
//                                     future resolves
//
// The set is explicit data, not a class hierarchy: an executor reports its
// native operations through `capabilities()` and overrides exactly those
// trait methods. The `dispatch` module routes engine requests to a native
// operation when one exists and synthesizes the operation from whichever
// capability is present otherwise.

/// One of the three bulk dispatch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Synchronous,
    Asynchronous,
    Continuation,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Capability::Synchronous => 1 << 0,
            Capability::Asynchronous => 1 << 1,
            Capability::Continuation => 1 << 2,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Synchronous => "synchronous",
            Capability::Asynchronous => "asynchronous",
            Capability::Continuation => "continuation",
        };
        f.write_str(name)
    }
}

/// A set of [`Capability`] values. An executor must expose at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        CapabilitySet(0)
    }

    pub const fn with(self, cap: Capability) -> Self {
        CapabilitySet(self.0 | cap.bit())
    }

    pub const fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<Capability> for CapabilitySet {
    fn from(cap: Capability) -> Self {
        CapabilitySet::empty().with(cap)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        write!(f, "{{")?;
        for cap in [
            Capability::Synchronous,
            Capability::Asynchronous,
            Capability::Continuation,
        ] {
            if self.contains(cap) {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{cap}")?;
                first = false;
            }
        }
        write!(f, "}}")
    }
}

// BulkExecutor — The uniform flat-family contract
//
// Lane contract: `f(i, &result, &shared)` for every `i` in `[0, n)`. The
// result and shared objects are created once, by `result_factory(n)` and
// `shared_factory(n)`, before any lane runs, and every lane receives them by
// reference; lanes coordinate their own interior mutability. The result is
// handed back only after every lane has finished.
//
// Executors override the operations they support natively and report them
// via `capabilities()`; the defaults report the operation as unsupported.
// Engine code goes through the `dispatch` module, which never calls an
// operation the capability set does not contain.

/// A capability-bearing bulk dispatcher over a flat index space.
pub trait BulkExecutor: Clone + Send + Sync + 'static {
    /// The operations this executor implements natively.
    fn capabilities(&self) -> CapabilitySet;

    /// Run `f` over `[0, n)` and return the aggregated result.
    fn bulk_execute<F, R, S, RF, SF>(
        &self,
        _f: F,
        _n: usize,
        _result_factory: RF,
        _shared_factory: SF,
    ) -> Result<R>
    where
        F: Fn(usize, &R, &S) + Send + Sync + 'static,
        R: Send + Sync + 'static,
        S: Send + Sync + 'static,
        RF: FnOnce(usize) -> R + Send + 'static,
        SF: FnOnce(usize) -> S + Send + 'static,
    {
        Err(Error::Unsupported(Capability::Synchronous))
    }

    /// Run `f` over `[0, n)` on a background task; the returned future
    /// resolves to the aggregated result. Errors travel through the future.
    fn bulk_async_execute<F, R, S, RF, SF>(
        &self,
        _f: F,
        _n: usize,
        _result_factory: RF,
        _shared_factory: SF,
    ) -> Future<R>
    where
        F: Fn(usize, &R, &S) + Send + Sync + 'static,
        R: Send + Sync + 'static,
        S: Send + Sync + 'static,
        RF: FnOnce(usize) -> R + Send + 'static,
        SF: FnOnce(usize) -> S + Send + 'static,
    {
        Future::err(Error::Unsupported(Capability::Asynchronous))
    }

    /// Once `predecessor` resolves, run `f` over `[0, n)`; each lane also
    /// receives the predecessor's value. Errors travel through the future.
    fn bulk_then_execute<T, F, R, S, RF, SF>(
        &self,
        _f: F,
        _n: usize,
        _predecessor: Future<T>,
        _result_factory: RF,
        _shared_factory: SF,
    ) -> Future<R>
    where
        T: Send + Sync + 'static,
        F: Fn(usize, &T, &R, &S) + Send + Sync + 'static,
        R: Send + Sync + 'static,
        S: Send + Sync + 'static,
        RF: FnOnce(usize) -> R + Send + 'static,
        SF: FnOnce(usize) -> S + Send + 'static,
    {
        Future::err(Error::Unsupported(Capability::Continuation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set() {
        let set = CapabilitySet::empty()
            .with(Capability::Synchronous)
            .with(Capability::Continuation);
        assert!(set.contains(Capability::Synchronous));
        assert!(set.contains(Capability::Continuation));
        assert!(!set.contains(Capability::Asynchronous));
        assert!(!set.is_empty());
        assert!(CapabilitySet::empty().is_empty());
    }

    #[test]
    fn test_capability_set_display() {
        let set = CapabilitySet::from(Capability::Synchronous).with(Capability::Asynchronous);
        assert_eq!(format!("{set}"), "{synchronous, asynchronous}");
    }
}
