//! Guard and Handle for critical-section management.
//!
//! `pin()` announces the thread in the current epoch; the returned RAII
//! guard keeps every pointer retired less than two epochs ago alive. Nested
//! `pin()` calls are cheap: only the outermost pin publishes, inner guards
//! share its protection.

use crate::registry::{self, Retired, ThreadRecord, BINS};
use core::marker::PhantomData as marker;
use std::cell::{Cell, OnceCell};
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

/// Retires between advancement attempts on one thread.
const ADVANCE_FREQ: usize = 64;

/// RAII guard representing an active critical section.
///
/// While a Guard exists the thread counts as active in its announced epoch,
/// which blocks epoch advancement past it. When the last guard on a thread
/// drops, the thread goes inactive.
pub struct Guard {
    _private: (),
    marker: marker<*mut ()>,
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        // Use try_with to handle process teardown gracefully: during static
        // destructor execution TLS may already be gone, and a dummy guard
        // was never pinned.
        let _ = HANDLE.try_with(|handle| {
            let count = handle.pin_count.get();
            handle.pin_count.set(count.saturating_sub(1));
            if count == 1 {
                if let Some(record) = handle.record.get() {
                    record.active.store(false, Ordering::Release);
                }
            }
        });
    }
}

struct Handle {
    record: OnceCell<Arc<ThreadRecord>>,
    /// Number of live Guard instances on this thread.
    pin_count: Cell<usize>,
    /// Retire counter driving periodic advancement attempts.
    retire_count: Cell<usize>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            record: OnceCell::new(),
            pin_count: Cell::new(0),
            retire_count: Cell::new(0),
        }
    }

    #[inline]
    fn record(&self) -> &Arc<ThreadRecord> {
        self.record.get_or_init(registry::register)
    }

    fn pin(&self) -> Guard {
        let count = self.pin_count.get();
        self.pin_count.set(count + 1);

        if count > 0 {
            // Nested pin: the outermost guard's epoch still protects us.
            return Guard {
                _private: (),
                marker,
            };
        }

        let record = self.record();
        // Become visible first: once `active` is published, an advancement
        // scan that sees a stale `local_epoch` simply refuses to advance.
        // Announcing the epoch before visibility would leave a window where
        // two back-to-back advances free a generation this pin can still
        // reach.
        record.active.store(true, Ordering::Release);
        fence(Ordering::SeqCst);

        // Converge on the current epoch. After visibility the epoch can
        // move at most once more before our announcement pins it.
        let mut epoch = registry::global_epoch();
        loop {
            record.local_epoch.store(epoch, Ordering::SeqCst);
            let current = registry::global_epoch();
            if current == epoch {
                break;
            }
            epoch = current;
        }

        Guard {
            _private: (),
            marker,
        }
    }

    unsafe fn retire(&self, ptr: *mut u8, deleter: unsafe fn(*mut u8)) {
        debug_assert!(
            self.pin_count.get() > 0,
            "retire requires an active critical section"
        );
        let record = self.record();
        let bin = (record.local_epoch.load(Ordering::Relaxed) % BINS as u64) as usize;
        record.bins[bin].lock().push(Retired { ptr, deleter });

        let retires = self.retire_count.get() + 1;
        self.retire_count.set(retires);
        if retires % ADVANCE_FREQ == 0 {
            registry::try_advance();
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(record) = self.record.get() {
            record.active.store(false, Ordering::Release);
            record.dead.store(true, Ordering::Release);
            // Best effort: drain what the grace periods already allow. The
            // record itself lingers in the registry until its bins empty.
            registry::try_advance();
        }
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Enter a critical section.
///
/// Any pointer read from a shared structure while the guard lives is safe to
/// dereference until the guard drops, provided the structure retires nodes
/// through [`retire`] instead of freeing them in place.
#[inline]
pub fn pin() -> Guard {
    HANDLE.try_with(|handle| handle.pin()).unwrap_or(Guard {
        // TLS torn down: no record to publish; the dummy guard's drop is a
        // matching no-op.
        _private: (),
        marker,
    })
}

/// Defer `deleter(ptr)` until no thread can still hold `ptr`.
///
/// # Safety
///
/// - The caller must hold a [`Guard`].
/// - `ptr` must be unreachable for new readers (already unlinked).
/// - `ptr` must not be retired twice, and `deleter` must be valid for it.
#[inline]
pub unsafe fn retire(ptr: *mut u8, deleter: unsafe fn(*mut u8)) {
    // During process teardown the node leaks; the OS reclaims it.
    let _ = HANDLE.try_with(|handle| unsafe { handle.retire(ptr, deleter) });
}

/// Retire a `T` that was placed in thread-heap memory: runs its destructor,
/// then returns the block to the slab allocator (remote-free safe).
///
/// # Safety
///
/// Same as [`retire`], and `ptr` must come from `petek_alloc::allocate` with
/// a properly initialized `T` at offset 0.
#[inline]
pub unsafe fn retire_heap<T>(ptr: *mut T) {
    unsafe fn deleter<T>(ptr: *mut u8) {
        let typed = ptr as *mut T;
        // SAFETY: retire_heap's contract.
        unsafe {
            core::ptr::drop_in_place(typed);
            petek_alloc::deallocate(core::ptr::NonNull::new_unchecked(ptr));
        }
    }
    unsafe { retire(ptr as *mut u8, deleter::<T>) }
}

/// Retire a `Box`-allocated `T`.
///
/// # Safety
///
/// Same as [`retire`], and `ptr` must come from `Box::into_raw`.
#[inline]
pub unsafe fn retire_boxed<T>(ptr: *mut T) {
    unsafe fn deleter<T>(ptr: *mut u8) {
        // SAFETY: retire_boxed's contract.
        unsafe { drop(Box::from_raw(ptr as *mut T)) }
    }
    unsafe { retire(ptr as *mut u8, deleter::<T>) }
}

/// Force reclamation of everything whose grace period has elapsed, advancing
/// the epoch as far as the current set of active threads allows.
///
/// Useful at the end of tests and before process exit; it cannot reclaim
/// objects still protected by another thread's guard.
pub fn flush() {
    for _ in 0..BINS + 1 {
        if !registry::try_advance() {
            break;
        }
    }
}
