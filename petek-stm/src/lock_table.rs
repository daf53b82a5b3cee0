//! Striped spinlock table for the optimistic commit window.
//!
//! A fixed array of cache-line-padded TTAS bit locks; cells map to stripes
//! by hashing their address. Callers must sort and deduplicate stripe
//! indices before locking; ascending acquisition order is what rules out
//! deadlock between concurrent committers.

use core::hash::BuildHasher;
use core::hint::spin_loop;
use foldhash::fast::FixedState;
use once_cell::sync::Lazy;
use petek_alloc::CacheAligned;
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of stripes. Power of two.
pub const STRIPE_COUNT: usize = 1 << 14;

struct Stripe {
    flag: CacheAligned<AtomicBool>,
}

static TABLE: Lazy<Box<[Stripe]>> = Lazy::new(|| {
    (0..STRIPE_COUNT)
        .map(|_| Stripe {
            flag: CacheAligned::new(AtomicBool::new(false)),
        })
        .collect()
});

/// Stripe index for a cell address.
#[inline]
pub fn stripe_of(addr: usize) -> usize {
    FixedState::default().hash_one(addr) as usize & (STRIPE_COUNT - 1)
}

/// Spin until the stripe is acquired. Non-reentrant: locking a stripe twice
/// from one thread deadlocks, hence the dedup requirement.
pub fn lock(index: usize) {
    let flag = &TABLE[index].flag;
    loop {
        // Test phase: stay in cache until the lock looks free.
        if flag.load(Ordering::Relaxed) {
            spin_loop();
            continue;
        }
        if !flag.swap(true, Ordering::Acquire) {
            return;
        }
        std::thread::yield_now();
    }
}

#[inline]
pub fn unlock(index: usize) {
    TABLE[index].flag.store(false, Ordering::Release);
}

#[inline]
pub fn is_locked(index: usize) -> bool {
    TABLE[index].flag.load(Ordering::Acquire)
}

#[inline]
pub fn is_locked_addr(addr: usize) -> bool {
    is_locked(stripe_of(addr))
}
