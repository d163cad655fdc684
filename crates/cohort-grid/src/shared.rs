use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

// SharedSlot — Uninitialized per-group storage
//
// Backs the inner shared parameter of a launch: one slot per group, created
// uninitialized before the launch. The group's first lane constructs the
// value, the group barrier orders construction before any read, the second
// barrier orders every read before destruction, and the same first lane
// destroys the value. The readiness flag makes the construct/destroy
// handshake observable so a failed construction degrades to "skip the body"
// instead of an uninitialized read.
//
// All synchronization between lanes comes from the group barrier; the
// atomic only publishes the initialized bytes across it.

pub(crate) struct SharedSlot<T> {
    ready: AtomicBool,
    value: UnsafeCell<MaybeUninit<T>>,
}

// Lanes of a group share `&SharedSlot` across their threads. `T` crosses
// thread boundaries on construct/destroy and is read concurrently.
unsafe impl<T: Send + Sync> Sync for SharedSlot<T> {}

impl<T> SharedSlot<T> {
    pub(crate) fn new() -> Self {
        SharedSlot {
            ready: AtomicBool::new(false),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// # Safety
    /// Exactly one lane of the group may call this, before the group's
    /// first barrier.
    pub(crate) unsafe fn construct(&self, value: T) {
        (*self.value.get()).write(value);
        self.ready.store(true, Ordering::Release);
    }

    /// Read the constructed value, or `None` if construction never
    /// happened.
    ///
    /// # Safety
    /// Only between the group's construct barrier and destroy barrier.
    pub(crate) unsafe fn get(&self) -> Option<&T> {
        if self.ready.load(Ordering::Acquire) {
            Some((*self.value.get()).assume_init_ref())
        } else {
            None
        }
    }

    /// # Safety
    /// Exactly one lane of the group may call this, after the group's
    /// second barrier; no reference from `get` may outlive it.
    pub(crate) unsafe fn destroy(&self) {
        if self.ready.swap(false, Ordering::AcqRel) {
            (*self.value.get()).assume_init_drop();
        }
    }
}

impl<T> Drop for SharedSlot<T> {
    fn drop(&mut self) {
        // Normally destroyed by the group's first lane; this only cleans up
        // launches that failed between construct and destroy.
        if *self.ready.get_mut() {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

/// One [`SharedSlot`] per group of a launch.
pub(crate) struct GroupSlots<T> {
    slots: Vec<SharedSlot<T>>,
}

impl<T> GroupSlots<T> {
    pub(crate) fn new(group_count: usize) -> Self {
        GroupSlots {
            slots: (0..group_count).map(|_| SharedSlot::new()).collect(),
        }
    }

    pub(crate) fn slot(&self, group_rank: usize) -> &SharedSlot<T> {
        &self.slots[group_rank]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_construct_get_destroy() {
        let slot = SharedSlot::new();
        unsafe {
            assert!(slot.get().is_none());
            slot.construct(41usize);
            assert_eq!(slot.get(), Some(&41));
            slot.destroy();
            assert!(slot.get().is_none());
        }
    }

    #[test]
    fn test_destroy_runs_drop_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let slot = SharedSlot::new();
        unsafe {
            slot.construct(DropCounter(drops.clone()));
            slot.destroy();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(slot);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slot_drop_cleans_up_undestroyed_value() {
        let drops = Arc::new(AtomicUsize::new(0));
        let slot = SharedSlot::new();
        unsafe {
            slot.construct(DropCounter(drops.clone()));
        }
        drop(slot);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
