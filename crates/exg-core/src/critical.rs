//! Critical-section instrumentation.
//!
//! Shared buffers mark the span during which their lock is held with
//! [`enter`]. Compute stages (decoding, filtering) call [`compute_entered`] on
//! entry; doing so while the current thread holds a marked lock is counted as
//! a violation. Only memory copies may run inside a critical section.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    static DEPTH: Cell<u32> = Cell::new(0);
    static LOCAL_VIOLATIONS: Cell<u64> = Cell::new(0);
}

static VIOLATIONS: AtomicU64 = AtomicU64::new(0);

/// Marks the current thread as holding a buffer lock until dropped
#[must_use = "the critical section ends when the guard is dropped"]
pub struct CriticalSection {
    // Guard must be dropped on the thread that created it
    _not_send: PhantomData<*const ()>,
}

/// Enter a critical section on the current thread
pub fn enter() -> CriticalSection {
    DEPTH.with(|d| d.set(d.get() + 1));
    CriticalSection { _not_send: PhantomData }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Whether the current thread is inside a critical section
pub fn is_held() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

/// Record entry into a compute stage
#[inline]
pub fn compute_entered() {
    if is_held() {
        VIOLATIONS.fetch_add(1, Ordering::Relaxed);
        LOCAL_VIOLATIONS.with(|v| v.set(v.get() + 1));
    }
}

/// Process-wide count of compute stages entered under a lock
pub fn violations() -> u64 {
    VIOLATIONS.load(Ordering::Relaxed)
}

/// Violations recorded on the current thread
pub fn local_violations() -> u64 {
    LOCAL_VIOLATIONS.with(|v| v.get())
}
