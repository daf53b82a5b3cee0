//! Global epoch, per-thread records, and the advancement scan.

use once_cell::sync::Lazy;
use petek_alloc::{CacheAligned, SpinLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Retire generations. An object retired in epoch `e` lives in bin
/// `e mod 3` and is freed when the epoch reaches `e + 2`.
pub(crate) const BINS: usize = 3;

/// A deferred deletion: pointer plus its type-erased deleter.
pub(crate) struct Retired {
    pub ptr: *mut u8,
    pub deleter: unsafe fn(*mut u8),
}

// Retired pointers are only dereferenced by the deleter, after the grace
// period has excluded every reader.
unsafe impl Send for Retired {}

pub(crate) struct ThreadRecord {
    pub active: AtomicBool,
    pub local_epoch: AtomicU64,
    /// Set when the owning thread exits; the record lingers until its bins
    /// drain.
    pub dead: AtomicBool,
    pub bins: [SpinLock<Vec<Retired>>; BINS],
}

impl ThreadRecord {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            local_epoch: AtomicU64::new(0),
            dead: AtomicBool::new(false),
            bins: [
                SpinLock::new(Vec::new()),
                SpinLock::new(Vec::new()),
                SpinLock::new(Vec::new()),
            ],
        }
    }

    fn bins_empty(&self) -> bool {
        self.bins.iter().all(|bin| bin.lock().is_empty())
    }
}

static GLOBAL_EPOCH: CacheAligned<AtomicU64> = CacheAligned::new(AtomicU64::new(0));

static REGISTRY: Lazy<SpinLock<Vec<Arc<ThreadRecord>>>> = Lazy::new(|| SpinLock::new(Vec::new()));

/// Current global epoch.
#[inline]
pub fn global_epoch() -> u64 {
    GLOBAL_EPOCH.load(Ordering::Acquire)
}

pub(crate) fn register() -> Arc<ThreadRecord> {
    let record = Arc::new(ThreadRecord::new());
    REGISTRY.lock().push(Arc::clone(&record));
    record
}

/// Try to advance the global epoch by one.
///
/// Succeeds iff every active thread has observed the current epoch. On
/// success, bin `(E_new − 2) mod 3` of every record is drained and its
/// deleters run: everything in it was retired two grace periods ago, so no
/// reader can still hold one of those pointers. Records of dead threads are
/// dropped once their bins are empty.
pub fn try_advance() -> bool {
    let mut reclaim: Vec<Retired> = Vec::new();

    {
        let mut records = REGISTRY.lock();
        let epoch = GLOBAL_EPOCH.load(Ordering::Acquire);

        for record in records.iter() {
            if record.active.load(Ordering::Acquire)
                && record.local_epoch.load(Ordering::Acquire) != epoch
            {
                return false;
            }
        }

        // Advancers serialize on the registry lock, so a plain store is a
        // single +1 step.
        let new_epoch = epoch + 1;
        GLOBAL_EPOCH.store(new_epoch, Ordering::SeqCst);

        let bin = ((new_epoch + 1) % BINS as u64) as usize;
        records.retain(|record| {
            reclaim.append(&mut record.bins[bin].lock());
            let drop_record = record.dead.load(Ordering::Acquire)
                && !record.active.load(Ordering::Acquire)
                && record.bins_empty();
            !drop_record
        });
    }

    // Deleters run outside every lock; they may re-enter the allocator.
    if !reclaim.is_empty() {
        log::trace!("reclaiming {} retired object(s)", reclaim.len());
    }
    for retired in reclaim {
        // SAFETY: the grace period above makes the pointer unreachable.
        unsafe { (retired.deleter)(retired.ptr) };
    }
    true
}
