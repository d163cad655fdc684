use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Error, Result};

// Future — Deferred result of a bulk operation
//
// A single-producer, single-consumer promise/future pair. The producer side
// resolves exactly once with a `Result<T>`; the consumer side either blocks
// (`wait`/`get`) or attaches one continuation (`then`) that observes the
// eventual value whether it is attached before or after resolution.
//
// Dropping an unresolved Promise resolves the future with
// `Error::BrokenPromise`, so a consumer can never block forever on an
// abandoned operation.
//
// Usage:
//
//   let (promise, future) = Future::pair();
//   rayon::spawn(move || promise.complete(Ok(compute())));
//   let value = future.get()?;

enum Slot<T> {
    /// Not yet resolved; holds the continuation if one was attached.
    Pending(Option<Box<dyn FnOnce(Result<T>) + Send>>),
    /// Resolved, value not yet consumed.
    Ready(Result<T>),
    /// Value handed to a continuation or taken by `get`.
    Taken,
}

struct Channel<T> {
    slot: Mutex<Slot<T>>,
    resolved: Condvar,
}

/// The producer side: resolves the paired [`Future`] exactly once.
pub struct Promise<T> {
    channel: Option<Arc<Channel<T>>>,
}

/// The consumer side of a deferred `Result<T>`.
pub struct Future<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Future<T> {
    /// A connected promise/future pair.
    pub fn pair() -> (Promise<T>, Future<T>) {
        let channel = Arc::new(Channel {
            slot: Mutex::new(Slot::Pending(None)),
            resolved: Condvar::new(),
        });
        (
            Promise {
                channel: Some(channel.clone()),
            },
            Future { channel },
        )
    }

    /// An already-resolved future holding `value`.
    pub fn ready(value: T) -> Future<T> {
        Future::from_result(Ok(value))
    }

    /// An already-resolved future holding an error.
    pub fn err(error: Error) -> Future<T> {
        Future::from_result(Err(error))
    }

    /// An already-resolved future holding `result`.
    pub fn from_result(result: Result<T>) -> Future<T> {
        Future {
            channel: Arc::new(Channel {
                slot: Mutex::new(Slot::Ready(result)),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Whether the future has resolved.
    pub fn is_ready(&self) -> bool {
        !matches!(
            *self.channel.slot.lock().expect("future lock poisoned"),
            Slot::Pending(_)
        )
    }

    /// Block the calling context until the future resolves.
    pub fn wait(&self) {
        let mut slot = self.channel.slot.lock().expect("future lock poisoned");
        while matches!(*slot, Slot::Pending(_)) {
            slot = self
                .channel
                .resolved
                .wait(slot)
                .expect("future lock poisoned");
        }
    }

    /// Block until resolved, then take the value. The value (or the error)
    /// is observed exactly once.
    pub fn get(self) -> Result<T> {
        self.wait();
        let mut slot = self.channel.slot.lock().expect("future lock poisoned");
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(result) => result,
            // `then` consumes the future, so the value can only have been
            // taken through this same handle.
            Slot::Pending(_) | Slot::Taken => unreachable!("future value taken twice"),
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Attach a continuation mapping this future's result into a new future.
    ///
    /// Runs immediately on the calling thread if already resolved, otherwise
    /// on the thread that resolves the promise.
    pub fn then<U, G>(self, g: G) -> Future<U>
    where
        U: Send + 'static,
        G: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let (promise, future) = Future::pair();
        let mut slot = self.channel.slot.lock().expect("future lock poisoned");
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(result) => {
                drop(slot);
                promise.complete(g(result));
            }
            Slot::Pending(prev) => {
                debug_assert!(prev.is_none(), "future continuation attached twice");
                *slot = Slot::Pending(Some(Box::new(move |result| {
                    promise.complete(g(result));
                })));
            }
            Slot::Taken => unreachable!("future value taken twice"),
        }
        future
    }
}

impl<T> Promise<T> {
    /// Resolve the paired future. Consumes the promise.
    pub fn complete(mut self, result: Result<T>) {
        if let Some(channel) = self.channel.take() {
            Promise::deliver(&channel, result);
        }
    }

    fn deliver(channel: &Channel<T>, result: Result<T>) {
        let continuation = {
            let mut slot = channel.slot.lock().expect("future lock poisoned");
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Pending(Some(cont)) => Some(cont),
                Slot::Pending(None) => {
                    *slot = Slot::Ready(result);
                    channel.resolved.notify_all();
                    return;
                }
                Slot::Ready(_) | Slot::Taken => unreachable!("promise resolved twice"),
            }
        };
        // Run the continuation outside the lock.
        if let Some(cont) = continuation {
            cont(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            Promise::deliver(&channel, Err(Error::BrokenPromise));
        }
    }
}
