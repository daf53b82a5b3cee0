//! Global version clock shared by every engine variant.
//!
//! Monotonicity is the only invariant: a value returned by `tick` is
//! strictly greater than every previously returned value, on any thread.

use petek_alloc::CacheAligned;
use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: CacheAligned<AtomicU64> = CacheAligned::new(AtomicU64::new(0));

/// Current clock value.
#[inline]
pub fn now() -> u64 {
    CLOCK.load(Ordering::Relaxed)
}

/// Advance the clock and return the new value.
#[inline]
pub fn tick() -> u64 {
    CLOCK.fetch_add(1, Ordering::AcqRel) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_strictly_increasing() {
        let a = tick();
        let b = tick();
        assert!(b > a);
        assert!(now() >= b);
    }
}
