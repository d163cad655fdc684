use log::trace;

use cohort_core::capability::BulkExecutor;
use cohort_core::dispatch;
use cohort_core::error::{Error, Result};

// copy — Element-wise copy through the engine
//
// The engine's most visible consumer: one lane per element, each writing
// exactly its own rank. `copy` dispatches through any bulk executor;
// `copy_sequential` is the plain loop used under sequenced execution.

/// A source/destination span handed to the copy lanes. Each lane `i` reads
/// `src[i]` and writes `dst[i]` and nothing else, so the writes are
/// disjoint; the dispatch call blocks until every lane completes, keeping
/// both borrows live past the last access.
struct RawSpan<T> {
    src: *const T,
    dst: *mut T,
}

unsafe impl<T: Send> Send for RawSpan<T> {}
unsafe impl<T: Sync> Sync for RawSpan<T> {}

/// Copy `src` into `dst` element-wise, one lane per element, through
/// `executor`'s best available capability.
pub fn copy<E, T>(executor: &E, src: &[T], dst: &mut [T]) -> Result<()>
where
    E: BulkExecutor,
    T: Copy + Send + Sync + 'static,
{
    if src.len() != dst.len() {
        return Err(Error::msg(format!(
            "copy length mismatch: {} source elements, {} destination slots",
            src.len(),
            dst.len()
        )));
    }

    let n = src.len();
    trace!("copying {n} elements through bulk dispatch");
    let span = RawSpan {
        src: src.as_ptr(),
        dst: dst.as_mut_ptr(),
    };
    dispatch::bulk_execute(
        executor,
        |i, _result: &(), span: &RawSpan<T>| unsafe {
            *span.dst.add(i) = *span.src.add(i);
        },
        n,
        |_| (),
        move |_| span,
    )?;
    Ok(())
}

/// Copy `src` into `dst` element-wise with a plain sequential loop.
pub fn copy_sequential<T: Clone>(src: &[T], dst: &mut [T]) -> Result<()> {
    if src.len() != dst.len() {
        return Err(Error::msg(format!(
            "copy length mismatch: {} source elements, {} destination slots",
            src.len(),
            dst.len()
        )));
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s.clone();
    }
    Ok(())
}
