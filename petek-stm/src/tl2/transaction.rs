use super::node::VersionNode;
use super::var::TVar;
use crate::errors::StmError;
use crate::{clock, lock_table};
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{fence, Ordering};
use petek_alloc::config::MIN_ALIGN;
use petek_ebr::Guard;

mod sealed {
    pub trait Sealed {}
}

/// Validation discipline of an optimistic transaction.
pub trait Validation: sealed::Sealed + 'static {
    #[doc(hidden)]
    const NAME: &'static str;

    /// Type-erased read-set validator for cells of payload type `T`.
    #[doc(hidden)]
    fn validator<T: Send + Sync + 'static>() -> unsafe fn(*const (), *mut (), u64) -> bool;
}

/// TL2: a read is valid iff the cell's newest version still predates the
/// transaction's read version.
pub enum Strict {}

/// Lazy snapshot: a read stays valid as long as any version visible at the
/// read version remains reachable.
pub enum Snapshot {}

impl sealed::Sealed for Strict {}
impl Validation for Strict {
    const NAME: &'static str = "tl2";

    fn validator<T: Send + Sync + 'static>() -> unsafe fn(*const (), *mut (), u64) -> bool {
        TVar::<T>::validate_strict
    }
}

impl sealed::Sealed for Snapshot {}
impl Validation for Snapshot {
    const NAME: &'static str = "lsa";

    fn validator<T: Send + Sync + 'static>() -> unsafe fn(*const (), *mut (), u64) -> bool {
        TVar::<T>::validate_snapshot
    }
}

struct ReadEntry {
    var: *const (),
    observed: *mut (),
    validator: unsafe fn(*const (), *mut (), u64) -> bool,
    /// Strict head check used instead of `validator` when the cell is also
    /// in the write set: snapshot reachability alone would let a concurrent
    /// commit slip under a read-modify-write (lost update).
    strict: unsafe fn(*const (), *mut (), u64) -> bool,
}

struct WriteEntry {
    var: *const (),
    node: *mut (),
    committer: unsafe fn(*const (), *mut (), u64),
    aborter: unsafe fn(*mut ()),
}

struct AllocEntry {
    ptr: *mut u8,
    dropper: unsafe fn(*mut u8),
}

/// One optimistic transaction attempt.
///
/// Created by the `occ`/`lsa` runners; reads and writes are recorded in the
/// descriptor sets and take effect only if `commit` returns `true`. Dropping
/// an unfinished transaction (closure panic, user error) rolls everything
/// back: staged versions are discarded and transactional allocations are
/// destroyed.
pub struct Transaction<'g, V: Validation> {
    _guard: &'g Guard,
    read_version: u64,
    read_set: Vec<ReadEntry>,
    write_set: Vec<WriteEntry>,
    alloc_set: Vec<AllocEntry>,
    lock_set: Vec<usize>,
    finished: bool,
    _policy: PhantomData<V>,
}

impl<'g, V: Validation> Transaction<'g, V> {
    pub(crate) fn new(guard: &'g Guard) -> Self {
        Self {
            _guard: guard,
            read_version: clock::now(),
            read_set: Vec::new(),
            write_set: Vec::new(),
            alloc_set: Vec::new(),
            lock_set: Vec::new(),
            finished: false,
            _policy: PhantomData,
        }
    }

    /// Read a variable, recording it in the read set.
    ///
    /// Returns [`StmError::Retry`] when no version visible at the read
    /// version exists or the cell is in a foreign commit window.
    pub fn load<T>(&mut self, var: &TVar<T>) -> Result<T, StmError>
    where
        T: Send + Sync + Clone + 'static,
    {
        let var_ptr = var as *const TVar<T> as *const ();

        // Read-your-own-writes, most recent store first.
        for entry in self.write_set.iter().rev() {
            if entry.var == var_ptr {
                let node = entry.node as *mut VersionNode<T>;
                // SAFETY: staged nodes are ours until commit or abort.
                return Ok(unsafe { (*node).payload.clone() });
            }
        }

        if lock_table::is_locked_addr(var_ptr as usize) {
            return Err(StmError::Retry);
        }

        let head = var.load_head();
        let mut curr = head;
        while !curr.is_null() {
            // SAFETY: chain nodes are protected by the transaction's guard.
            let node = unsafe { &*curr };
            if node.write_ts <= self.read_version {
                let value = node.payload.clone();
                if !self.read_set.iter().any(|entry| entry.var == var_ptr) {
                    self.read_set.push(ReadEntry {
                        var: var_ptr,
                        observed: head as *mut (),
                        validator: V::validator::<T>(),
                        strict: TVar::<T>::validate_strict,
                    });
                }
                return Ok(value);
            }
            curr = node.prev.load(Ordering::Acquire);
        }

        // Every version visible at our read version has been trimmed away.
        Err(StmError::Retry)
    }

    /// Stage a write. Takes effect at commit; until then only this
    /// transaction sees it (through [`Transaction::load`]).
    pub fn store<T>(&mut self, var: &TVar<T>, value: T) -> Result<(), StmError>
    where
        T: Send + Sync + 'static,
    {
        let node = VersionNode::create(0, core::ptr::null_mut(), value)?;
        self.write_set.push(WriteEntry {
            var: var as *const TVar<T> as *const (),
            node: node.as_ptr() as *mut (),
            committer: TVar::<T>::commit_version,
            aborter: TVar::<T>::discard_version,
        });
        Ok(())
    }

    /// Transaction-scoped allocation from the thread heap. The object is
    /// destroyed (destructor, then deallocation) if the transaction aborts;
    /// a committed transaction adopts it.
    pub fn alloc<U: 'static>(&mut self, value: U) -> Result<*mut U, StmError> {
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

    /// Destroy an object previously obtained from [`Transaction::alloc`] in
    /// a committed transaction.
    ///
    /// # Safety
    ///
    /// `ptr` must be live, no longer reachable from any cell, and never
    /// used again. Freeing inside a transaction is immediate: it is not
    /// undone if the transaction later aborts.
    pub unsafe fn free<U>(&mut self, ptr: *mut U) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: forwarded caller contract.
        unsafe {
            core::ptr::drop_in_place(ptr);
            petek_alloc::deallocate(NonNull::new_unchecked(ptr as *mut u8));
        }
    }

    /// Attempt to commit. `true` means the transaction linearized at its
    /// write version; `false` means every effect was rolled back and the
    /// caller should start over.
    pub(crate) fn commit(&mut self) -> bool {
        if self.write_set.is_empty() {
            // Read-only fast path: nothing to publish, nothing to validate
            // beyond what each load already checked.
            self.conclude();
            return true;
        }

        self.lock_write_set();
        let write_version = clock::tick();

        if !self.validate_read_set() {
            self.unlock_write_set();
            self.rollback();
            return false;
        }

        for entry in &self.write_set {
            // SAFETY: stripe locks are held; nodes are staged and ours.
            unsafe { (entry.committer)(entry.var, entry.node, write_version) };
        }
        self.write_set.clear();

        self.unlock_write_set();
        self.conclude();
        true
    }

    fn lock_write_set(&mut self) {
        self.lock_set.clear();
        self.lock_set.extend(
            self.write_set
                .iter()
                .map(|entry| lock_table::stripe_of(entry.var as usize)),
        );
        self.lock_set.sort_unstable();
        self.lock_set.dedup();
        for &index in &self.lock_set {
            lock_table::lock(index);
        }
    }

    fn unlock_write_set(&mut self) {
        for &index in self.lock_set.iter().rev() {
            lock_table::unlock(index);
        }
        self.lock_set.clear();
    }

    fn validate_read_set(&self) -> bool {
        let rv = self.read_version;
        for entry in &self.read_set {
            let stripe = lock_table::stripe_of(entry.var as usize);
            let locked_by_me = self.lock_set.binary_search(&stripe).is_ok();

            if lock_table::is_locked(stripe) && !locked_by_me {
                return false;
            }
            let validator = if self.write_set.iter().any(|w| w.var == entry.var) {
                entry.strict
            } else {
                entry.validator
            };
            // SAFETY: entry.var outlives the transaction; guard is held.
            if !unsafe { (validator)(entry.var, entry.observed, rv) } {
                return false;
            }
            // Orders the validator's loads before the lock re-check, so a
            // committer cannot slip in between the two observations.
            fence(Ordering::SeqCst);
            if lock_table::is_locked(stripe) && !locked_by_me {
                return false;
            }
        }
        true
    }

    /// Roll back every staged effect: aborters in reverse order, then the
    /// allocation set (destructor + deallocation), newest first.
    fn rollback(&mut self) {
        while let Some(entry) = self.write_set.pop() {
            // SAFETY: staged nodes are still exclusively ours.
            unsafe { (entry.aborter)(entry.node) };
        }
        while let Some(entry) = self.alloc_set.pop() {
            // SAFETY: recorded by alloc, not yet adopted.
            unsafe { (entry.dropper)(entry.ptr) };
        }
        self.read_set.clear();
        self.finished = true;
    }

    /// Successful end: allocations are adopted, sets discarded.
    fn conclude(&mut self) {
        self.read_set.clear();
        self.alloc_set.clear();
        self.finished = true;
    }
}

impl<V: Validation> Drop for Transaction<'_, V> {
    fn drop(&mut self) {
        if !self.finished {
            // The closure bailed out (user error or panic): leave no trace.
            self.rollback();
        }
    }
}
