use super::descriptor::{TxDescriptor, TxStatus};
use super::node::WwNode;
use super::record::WriteRecord;
use super::var::{TMVar, TryInstall};
use crate::clock;
use crate::errors::StmError;
use core::ptr::NonNull;
use core::sync::atomic::Ordering;
use petek_alloc::config::MIN_ALIGN;
use petek_ebr::Guard;

struct ReadEntry {
    var: *const (),
    read_ts: u64,
    version: unsafe fn(*const ()) -> u64,
}

struct WriteEntry {
    var: *const (),
    record: *mut (),
    committer: unsafe fn(*const (), *mut (), u64),
    aborter: unsafe fn(*const (), *mut ()),
}

struct AllocEntry {
    ptr: *mut u8,
    dropper: unsafe fn(*mut u8),
}

/// One Wound-Wait transaction attempt.
///
/// Writers take cells eagerly by installing write records; conflicts are
/// resolved in favor of the older transaction (older wounds younger, younger
/// waits by retrying). A wound lands in the descriptor's status and is
/// observed at the next operation.
///
/// Usually driven through [`atomically`](super::atomically); the
/// constructor, [`commit`](Transaction::commit) and
/// [`abort`](Transaction::abort) are public so a single attempt can be
/// driven by hand.
pub struct Transaction<'g> {
    _guard: &'g Guard,
    desc: *mut TxDescriptor,
    start_ts: u64,
    active: bool,
    read_set: Vec<ReadEntry>,
    write_set: Vec<WriteEntry>,
    alloc_set: Vec<AllocEntry>,
    finished: bool,
}

impl<'g> Transaction<'g> {
    /// Begin a new attempt at the current clock value.
    pub fn new(guard: &'g Guard) -> Result<Self, StmError> {
        let start_ts = clock::now();
        let desc = TxDescriptor::create(start_ts)?;
        Ok(Self {
            _guard: guard,
            desc: desc.as_ptr(),
            start_ts,
            active: true,
            read_set: Vec::new(),
            write_set: Vec::new(),
            alloc_set: Vec::new(),
            finished: false,
        })
    }

    /// Start timestamp of this attempt; the Wound-Wait priority.
    #[inline]
    pub fn start_ts(&self) -> u64 {
        self.start_ts
    }

    /// Check for a wound from an older transaction; abort if one landed.
    fn ensure_active(&mut self) -> Result<(), StmError> {
        if !self.active {
            return Err(StmError::Retry);
        }
        // SAFETY: the descriptor lives until conclude/abort retires it.
        if unsafe { (*self.desc).status() } == TxStatus::Aborted {
            self.abort();
            return Err(StmError::Retry);
        }
        Ok(())
    }

    /// Read a variable. The value is the one visible to this transaction:
    /// its own draft for cells it wrote, the committed version otherwise.
    pub fn load<T>(&mut self, var: &TMVar<T>) -> Result<T, StmError>
    where
        T: Send + Sync + Clone + 'static,
    {
        self.ensure_active()?;
        let var_ptr = var as *const TMVar<T> as *const ();

        // A cell we wrote re-reads its own draft.
        if self.write_set.iter().any(|entry| entry.var == var_ptr) {
            return Ok(var.read_for(self.desc));
        }
        // A cell we read before must still be at the recorded version,
        // otherwise repeated loads inside one transaction would disagree.
        if let Some(read_ts) = self.read_ts_of(var_ptr) {
            if var.data_version() != read_ts {
                self.abort();
                return Err(StmError::Retry);
            }
            return Ok(var.read_for(self.desc));
        }

        let pre = var.data_version();
        let value = var.read_for(self.desc);
        let post = var.data_version();
        if pre != post {
            // A commit slipped between the version reads.
            self.abort();
            return Err(StmError::Retry);
        }

        self.read_set.push(ReadEntry {
            var: var_ptr,
            read_ts: pre,
            version: TMVar::<T>::data_version_erased,
        });
        Ok(value)
    }

    /// Write a variable, taking its record slot. Blocks conflicts out via
    /// Wound-Wait: an older contender aborts us (surfacing as `Retry`), a
    /// younger one is wounded or waits.
    pub fn store<T>(&mut self, var: &TMVar<T>, value: T) -> Result<(), StmError>
    where
        T: Send + Sync + Clone + 'static,
    {
        self.ensure_active()?;
        let var_ptr = var as *const TMVar<T> as *const ();

        let draft = WwNode::create(self.start_ts, value)?;
        let candidate = match WriteRecord::create(self.desc, draft.as_ptr()) {
            Ok(candidate) => candidate,
            Err(err) => {
                // SAFETY: the draft was never shared.
                unsafe { WwNode::destroy(draft.as_ptr()) };
                return Err(err);
            }
        };

        loop {
            // SAFETY: guard held; candidate unpublished and ours.
            match unsafe { var.try_install(self.desc, candidate) } {
                TryInstall::Reentrant => return Ok(()),
                TryInstall::Installed => {
                    if let Some(read_ts) = self.read_ts_of(var_ptr) {
                        if var.data_version() != read_ts {
                            // Lost update: the cell moved between our read
                            // and this write. Release the slot and retry
                            // the whole transaction.
                            // SAFETY: candidate is our published record.
                            unsafe { var.abort_record(candidate.as_ptr()) };
                            self.abort();
                            return Err(StmError::Retry);
                        }
                    }
                    self.write_set.push(WriteEntry {
                        var: var_ptr,
                        record: candidate.as_ptr() as *mut (),
                        committer: TMVar::<T>::commit_record_erased,
                        aborter: TMVar::<T>::abort_record_erased,
                    });
                    return Ok(());
                }
                TryInstall::Conflict(enemy) => {
                    let survive = self.resolve_conflict(enemy);
                    // SAFETY: descriptor alive until retired.
                    let wounded = unsafe { (*self.desc).status() } == TxStatus::Aborted;
                    if !survive || wounded {
                        // The candidate never reached a cell: reclaim it
                        // directly rather than through EBR.
                        // SAFETY: exclusively ours.
                        unsafe {
                            WwNode::destroy(candidate.as_ref().new.load(Ordering::Relaxed));
                            WriteRecord::destroy_shell(candidate.as_ptr());
                        }
                        self.abort();
                        return Err(StmError::Retry);
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Wound-Wait: older transactions wound younger record holders; younger
    /// contenders give way. Returns whether this transaction survives.
    fn resolve_conflict(&self, enemy: *mut TxDescriptor) -> bool {
        // SAFETY: descriptors reached through records are EBR-protected.
        let enemy_ref = unsafe { &*enemy };
        match enemy_ref.status() {
            TxStatus::Aborted => true,
            TxStatus::Committed => {
                // Cleanup will clear the record; the install loop re-reads.
                std::thread::yield_now();
                true
            }
            TxStatus::Active => {
                // Lexicographic priority: start timestamp, then descriptor
                // address as the deterministic tie-break.
                let i_am_older =
                    (self.start_ts, self.desc as usize) < (enemy_ref.start_ts, enemy as usize);
                if i_am_older {
                    // Wound. A failed CAS means the enemy resolved itself.
                    let _ = enemy_ref.try_abort();
                    true
                } else {
                    false
                }
            }
        }
    }

    fn read_ts_of(&self, var: *const ()) -> Option<u64> {
        self.read_set
            .iter()
            .find(|entry| entry.var == var)
            .map(|entry| entry.read_ts)
    }

    /// Transaction-scoped allocation from the thread heap; destroyed on
    /// abort, adopted on commit.
    pub fn alloc<U: 'static>(&mut self, value: U) -> Result<*mut U, StmError> {
        self.ensure_active()?;
        debug_assert!(core::mem::align_of::<U>() <= MIN_ALIGN);
        let raw = petek_alloc::allocate(core::mem::size_of::<U>().max(1))?.as_ptr() as *mut U;
        // SAFETY: fresh block of the right size.
        unsafe { raw.write(value) };

        unsafe fn dropper<U>(ptr: *mut u8) {
            // SAFETY: recorded pointers were written by alloc.
            unsafe {
                core::ptr::drop_in_place(ptr as *mut U);
                petek_alloc::deallocate(NonNull::new_unchecked(ptr));
            }
        }
        self.alloc_set.push(AllocEntry {
            ptr: raw as *mut u8,
            dropper: dropper::<U>,
        });
        Ok(raw)
    }

    /// Attempt to commit: revalidate the read set, flip the status (a wound
    /// may win the race), then publish every record at one commit
    /// timestamp.
    pub fn commit(&mut self) -> bool {
        if !self.active {
            self.abort();
            return false;
        }

        if !self.validate_read_set() {
            self.abort();
            return false;
        }

        // SAFETY: descriptor alive until retired below.
        if !unsafe { (*self.desc).try_commit() } {
            // Somebody wound us between validation and here.
            self.abort();
            return false;
        }

        if !self.write_set.is_empty() {
            let commit_ts = clock::tick();
            for entry in &self.write_set {
                // SAFETY: entries hold our published records; guard held.
                unsafe { (entry.committer)(entry.var, entry.record, commit_ts) };
            }
            self.write_set.clear();
        }

        self.conclude();
        true
    }

    fn validate_read_set(&self) -> bool {
        for entry in &self.read_set {
            if self.write_set.iter().any(|w| w.var == entry.var) {
                // We hold this cell's record; its version cannot move.
                continue;
            }
            // SAFETY: vars outlive the transaction; guard held.
            if unsafe { (entry.version)(entry.var) } != entry.read_ts {
                return false;
            }
        }
        true
    }

    /// Abort this attempt: wound-safe status flip, release every record in
    /// reverse order, tear down transactional allocations.
    pub fn abort(&mut self) {
        if self.finished {
            return;
        }
        // SAFETY: descriptor alive until retired below.
        unsafe {
            let _ = (*self.desc).try_abort();
        }
        self.active = false;

        while let Some(entry) = self.write_set.pop() {
            // SAFETY: entries hold records we installed; guard held.
            unsafe { (entry.aborter)(entry.var, entry.record) };
        }
        while let Some(entry) = self.alloc_set.pop() {
            // SAFETY: recorded by alloc, never adopted.
            unsafe { (entry.dropper)(entry.ptr) };
        }
        self.read_set.clear();

        // SAFETY: foreign threads may still hold the descriptor through
        // stale record pointers; EBR defers the free past them.
        unsafe { petek_ebr::retire_heap(self.desc) };
        self.finished = true;
    }

    fn conclude(&mut self) {
        self.active = false;
        self.read_set.clear();
        self.alloc_set.clear();
        // SAFETY: as in abort.
        unsafe { petek_ebr::retire_heap(self.desc) };
        self.finished = true;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}
