//! Shared-state primitives for the allocator's own bookkeeping: cache-line
//! padding for hot globals and a short-section spinlock.

use crate::config::LOCK_SPIN_LIMIT;
use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Rounds a value up to its own cache line so hot shared words (the central
/// cache lock, the global clocks) do not false-share with their neighbors.
///
/// The alignment tracks the coherence granule of the target: 256 B on
/// s390x, 128 B on aarch64 and powerpc64, 64 B elsewhere.
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(
    any(target_arch = "aarch64", target_arch = "powerpc64"),
    repr(align(128))
)]
#[cfg_attr(
    not(any(
        target_arch = "s390x",
        target_arch = "aarch64",
        target_arch = "powerpc64"
    )),
    repr(align(64))
)]
pub struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CacheAligned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Mutual exclusion for short critical sections (the central chunk cache,
/// the reclamation registry).
///
/// A waiter spins on a local read for [`LOCK_SPIN_LIMIT`] iterations on the
/// assumption that holders leave quickly, then starts yielding its time
/// slice so a preempted holder can finish.
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, blocking until it is free.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let mut spins = 0usize;
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinGuard { lock: self };
            }
            // Wait on a plain load so contended waiters stay in their own
            // cache line instead of ping-ponging the lock word.
            while self.locked.load(Ordering::Relaxed) {
                if spins < LOCK_SPIN_LIMIT {
                    spins += 1;
                    spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }
}

/// RAII guard for a [`SpinLock`]. Releases on drop.
pub struct SpinGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn cache_aligned_meets_granule() {
        assert!(core::mem::align_of::<CacheAligned<u64>>() >= 64);
        let padded = CacheAligned::new(7u64);
        assert_eq!(*padded, 7);
        assert_eq!(padded.into_inner(), 7);
    }

    #[test]
    fn lock_excludes_concurrent_increments() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 10_000;

        let counter = Arc::new(SpinLock::new(0usize));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("worker");
        }
        assert_eq!(*counter.lock(), THREADS * PER_THREAD);
    }
}
