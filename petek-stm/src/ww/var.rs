use super::descriptor::{TxDescriptor, TxStatus};
use super::node::WwNode;
use super::record::WriteRecord;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};

/// Outcome of a record-installation attempt.
pub(crate) enum TryInstall {
    /// The candidate record now owns the cell.
    Installed,
    /// The caller already owned the cell; its existing record was updated
    /// in place and the candidate shell was released.
    Reentrant,
    /// An `Active` foreign transaction owns the cell; resolve with
    /// Wound-Wait and try again.
    Conflict(*mut TxDescriptor),
}

/// A transactional variable for the Wound-Wait engine.
///
/// `data` always points at the current committed version. `record`, when
/// non-null, is the single in-flight write owned by exactly one
/// transaction; its owner's status decides which version readers see.
pub struct TMVar<T> {
    data: AtomicPtr<WwNode<T>>,
    record: AtomicPtr<WriteRecord<T>>,
}

unsafe impl<T: Send + Sync> Send for TMVar<T> {}
unsafe impl<T: Send + Sync> Sync for TMVar<T> {}

impl<T: Send + Sync + 'static> TMVar<T> {
    /// Create a new variable visible to every transaction (timestamp 0).
    pub fn new(value: T) -> Self {
        let node = WwNode::create(0, value)
            .unwrap_or_else(|_| std::alloc::handle_alloc_error(std::alloc::Layout::new::<T>()));
        Self {
            data: AtomicPtr::new(node.as_ptr()),
            record: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Timestamp of the committed version. Used for the read-time double
    /// check and for commit revalidation.
    #[inline]
    pub(crate) fn data_version(&self) -> u64 {
        // SAFETY: data is never null and the caller holds an EBR guard.
        unsafe { (*self.data.load(Ordering::Acquire)).write_ts }
    }

    /// The value visible to `me`: the draft for a record `me` owns, the new
    /// node behind a committed foreign record, the old node otherwise.
    pub(crate) fn read_for(&self, me: *mut TxDescriptor) -> T
    where
        T: Clone,
    {
        let record = self.record.load(Ordering::Acquire);
        if record.is_null() {
            // SAFETY: data is never null; guard held by the caller.
            return unsafe { (*self.data.load(Ordering::Acquire)).payload.clone() };
        }

        // SAFETY: published records are retired through EBR, so the guard
        // keeps this one alive even if its owner finishes right now.
        let record = unsafe { &*record };
        if record.owner == me {
            return unsafe { (*record.new.load(Ordering::Acquire)).payload.clone() };
        }
        // SAFETY: descriptors are EBR-managed like records.
        let node = match unsafe { (*record.owner).status() } {
            TxStatus::Committed => record.new.load(Ordering::Acquire),
            // For a live or aborted owner the committed version wins. The
            // `data` slot is that version by invariant, and unlike the
            // record's `old` snapshot it can never be stale while the
            // record is being released after a lost publish race.
            _ => self.data.load(Ordering::Acquire),
        };
        // SAFETY: both nodes outlive the record under the guard.
        unsafe { (*node).payload.clone() }
    }

    /// Try to make `candidate` the cell's in-flight record for `me`.
    ///
    /// Handles committed-but-uncleaned owners (yield and re-read), takes
    /// over from aborted owners, and detects the publish race where `data`
    /// moved between our snapshot and the CAS (release and retry). Only an
    /// `Active` foreign owner is returned to the caller.
    ///
    /// # Safety
    ///
    /// The caller must hold an EBR guard; `candidate` must be unpublished
    /// and owned by `me`.
    pub(crate) unsafe fn try_install(
        &self,
        me: *mut TxDescriptor,
        candidate: NonNull<WriteRecord<T>>,
    ) -> TryInstall {
        loop {
            let current = self.record.load(Ordering::Acquire);
            let data = self.data.load(Ordering::Acquire);

            if !current.is_null() {
                // SAFETY: record protected by the caller's guard.
                let cur = unsafe { &*current };

                if cur.owner == me {
                    // Re-entrant write: swap the draft inside the existing
                    // record and retire the superseded one.
                    let draft = unsafe { candidate.as_ref() }.new.load(Ordering::Relaxed);
                    let stale = cur.new.swap(draft, Ordering::AcqRel);
                    // SAFETY: the stale draft is unreachable for new readers
                    // (they re-read `new`); pinned readers are covered.
                    unsafe {
                        petek_ebr::retire_heap(stale);
                        WriteRecord::destroy_shell(candidate.as_ptr());
                    }
                    return TryInstall::Reentrant;
                }

                // SAFETY: descriptors are EBR-managed.
                match unsafe { (*cur.owner).status() } {
                    TxStatus::Active => return TryInstall::Conflict(cur.owner),
                    TxStatus::Committed => {
                        // Cleanup in progress: the committer will clear the
                        // slot momentarily.
                        std::thread::yield_now();
                        continue;
                    }
                    TxStatus::Aborted => {
                        unsafe { candidate.as_ref() }.old.store(data, Ordering::Relaxed);
                        if self
                            .record
                            .compare_exchange(
                                current,
                                candidate.as_ptr(),
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            // We stole the slot from an aborted owner: its
                            // draft and record are ours to retire.
                            // SAFETY: the CAS unpublished them.
                            unsafe {
                                petek_ebr::retire_heap(cur.new.load(Ordering::Acquire));
                                petek_ebr::retire_heap(current);
                            }
                            if self.check_publish_race(data) {
                                continue;
                            }
                            return TryInstall::Installed;
                        }
                        continue;
                    }
                }
            }

            unsafe { candidate.as_ref() }.old.store(data, Ordering::Relaxed);
            if self
                .record
                .compare_exchange(
                    ptr::null_mut(),
                    candidate.as_ptr(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                if self.check_publish_race(data) {
                    continue;
                }
                return TryInstall::Installed;
            }
        }
    }

    /// After winning the record CAS, re-read `data`: if it moved, a
    /// committer published between our snapshot and the CAS. Release the
    /// slot and report the race so the caller retries with fresh state.
    fn check_publish_race(&self, seen: *mut WwNode<T>) -> bool {
        if self.data.load(Ordering::Acquire) == seen {
            return false;
        }
        self.record.store(ptr::null_mut(), Ordering::Release);
        true
    }

    /// Commit the in-flight record: stamp and publish the draft, clear the
    /// slot, retire the superseded node and the record.
    ///
    /// # Safety
    ///
    /// `record` must be this cell's published record, owned by the
    /// committing transaction whose status is already `Committed`; the
    /// caller holds an EBR guard.
    pub(crate) unsafe fn commit_record(&self, record: *mut WriteRecord<T>, commit_ts: u64) {
        // SAFETY: per contract.
        let rec = unsafe { &*record };
        let new = rec.new.load(Ordering::Relaxed);
        let old = rec.old.load(Ordering::Relaxed);
        // SAFETY: the draft is unpublished until the store below.
        unsafe { (*new).write_ts = commit_ts };
        self.data.store(new, Ordering::Release);
        self.record.store(ptr::null_mut(), Ordering::Release);
        // SAFETY: old and the record are now unreachable for new readers.
        unsafe {
            petek_ebr::retire_heap(old);
            petek_ebr::retire_heap(record);
        }
    }

    /// Abort the in-flight record. If the CAS fails the slot was already
    /// stolen from our aborted descriptor and the thief owns the cleanup.
    ///
    /// # Safety
    ///
    /// `record` was installed by the aborting transaction; caller holds an
    /// EBR guard.
    pub(crate) unsafe fn abort_record(&self, record: *mut WriteRecord<T>) {
        if self
            .record
            .compare_exchange(record, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // SAFETY: the CAS unpublished the record and its draft.
            unsafe {
                let rec = &*record;
                petek_ebr::retire_heap(rec.new.load(Ordering::Acquire));
                petek_ebr::retire_heap(record);
            }
        }
    }

    // Type-erased hooks for the transaction's write set.

    /// # Safety
    ///
    /// `var` must point at a live `TMVar<T>`; caller holds an EBR guard.
    pub(crate) unsafe fn data_version_erased(var: *const ()) -> u64 {
        // SAFETY: per contract.
        unsafe { (*(var as *const TMVar<T>)).data_version() }
    }

    /// # Safety
    ///
    /// As [`TMVar::commit_record`], with `var`/`record` type-erased.
    pub(crate) unsafe fn commit_record_erased(var: *const (), record: *mut (), commit_ts: u64) {
        // SAFETY: per contract.
        unsafe {
            (*(var as *const TMVar<T>)).commit_record(record as *mut WriteRecord<T>, commit_ts)
        }
    }

    /// # Safety
    ///
    /// As [`TMVar::abort_record`], with `var`/`record` type-erased.
    pub(crate) unsafe fn abort_record_erased(var: *const (), record: *mut ()) {
        // SAFETY: per contract.
        unsafe { (*(var as *const TMVar<T>)).abort_record(record as *mut WriteRecord<T>) }
    }
}

impl<T> Drop for TMVar<T> {
    fn drop(&mut self) {
        // Exclusive access: no transaction holds this variable anymore.
        // A lingering record can only belong to an aborted attempt whose
        // cleanup lost the slot race; its pieces are ours now.
        let record = *self.record.get_mut();
        if !record.is_null() {
            // SAFETY: exclusively owned at drop.
            unsafe {
                let draft = (*record).new.load(Ordering::Relaxed);
                WwNode::destroy(draft);
                WriteRecord::destroy_shell(record);
            }
        }
        let data = *self.data.get_mut();
        // SAFETY: the committed node belongs to this variable alone.
        unsafe { WwNode::destroy(data) };
    }
}
