use super::node::VersionNode;
use super::MAX_HISTORY;
use core::sync::atomic::{AtomicPtr, Ordering};

/// A transactional variable for the optimistic engines.
///
/// Holds the newest link of an acyclic version chain (newest → older).
/// All access goes through a [`Transaction`](super::Transaction); the
/// variable itself only knows how to validate, publish, and discard
/// versions at the type-erased boundary.
pub struct TVar<T> {
    head: AtomicPtr<VersionNode<T>>,
}

// The chain is shared across threads; payloads are only cloned out under an
// EBR guard.
unsafe impl<T: Send + Sync> Send for TVar<T> {}
unsafe impl<T: Send + Sync> Sync for TVar<T> {}

impl<T: Send + Sync + 'static> TVar<T> {
    /// Create a new variable whose initial version is visible to every
    /// transaction (timestamp 0).
    pub fn new(value: T) -> Self {
        let node = VersionNode::create(0, core::ptr::null_mut(), value)
            .unwrap_or_else(|_| std::alloc::handle_alloc_error(std::alloc::Layout::new::<T>()));
        Self {
            head: AtomicPtr::new(node.as_ptr()),
        }
    }

    #[inline]
    pub(crate) fn load_head(&self) -> *mut VersionNode<T> {
        self.head.load(Ordering::Acquire)
    }

    /// Strict TL2 validation: the head must predate the reader.
    ///
    /// # Safety
    ///
    /// `var` must point to a live `TVar<T>`; the caller must hold an EBR
    /// guard.
    pub(crate) unsafe fn validate_strict(var: *const (), _observed: *mut (), rv: u64) -> bool {
        // SAFETY: per contract.
        let head = unsafe { (*(var as *const TVar<T>)).load_head() };
        if head.is_null() {
            return true;
        }
        // SAFETY: head is protected by the caller's guard.
        unsafe { (*head).write_ts <= rv }
    }

    /// Lazy-snapshot validation: some version visible at `rv` must still be
    /// reachable from the head.
    ///
    /// # Safety
    ///
    /// As [`TVar::validate_strict`].
    pub(crate) unsafe fn validate_snapshot(var: *const (), _observed: *mut (), rv: u64) -> bool {
        // SAFETY: per contract.
        let mut curr = unsafe { (*(var as *const TVar<T>)).load_head() };
        while !curr.is_null() {
            // SAFETY: chain nodes are protected by the caller's guard.
            let node = unsafe { &*curr };
            if node.write_ts <= rv {
                return true;
            }
            curr = node.prev.load(Ordering::Acquire);
        }
        false
    }

    /// Committer: stamp the staged node, link it in front of the current
    /// head, publish it, and retire history beyond [`MAX_HISTORY`].
    ///
    /// # Safety
    ///
    /// Caller holds the stripe lock covering `var` and an EBR guard; `node`
    /// is a staged `VersionNode<T>` owned by the committing transaction.
    pub(crate) unsafe fn commit_version(var: *const (), node: *mut (), write_ts: u64) {
        let var = unsafe { &*(var as *const TVar<T>) };
        let node = node as *mut VersionNode<T>;

        // SAFETY: the staged node is still exclusively ours.
        unsafe {
            (*node).write_ts = write_ts;
            let old_head = var.head.load(Ordering::Relaxed);
            (*node).prev.store(old_head, Ordering::Relaxed);
        }
        var.head.store(node, Ordering::Release);

        // Trim the chain: walk MAX_HISTORY links down, cut, and retire the
        // tail. Readers still inside the tail are covered by their guards.
        let mut curr = node;
        let mut depth = 0;
        while !curr.is_null() && depth < MAX_HISTORY {
            // SAFETY: chain nodes stay alive under the EBR grace period.
            curr = unsafe { (*curr).prev.load(Ordering::Acquire) };
            depth += 1;
        }
        if !curr.is_null() {
            // SAFETY: curr is a live chain node.
            let garbage = unsafe { (*curr).prev.swap(core::ptr::null_mut(), Ordering::AcqRel) };
            if !garbage.is_null() {
                // SAFETY: the cut makes the tail unreachable from the head.
                unsafe { petek_ebr::retire(garbage as *mut u8, Self::chain_deleter) };
            }
        }
    }

    /// Aborter: free a staged node that was never published.
    ///
    /// # Safety
    ///
    /// `node` must be a staged `VersionNode<T>` exclusively owned by the
    /// aborting transaction.
    pub(crate) unsafe fn discard_version(node: *mut ()) {
        // SAFETY: staged nodes are private to the transaction.
        unsafe { VersionNode::destroy(node as *mut VersionNode<T>) }
    }

    /// Cascading deleter for a cut-off chain tail.
    unsafe fn chain_deleter(head: *mut u8) {
        let mut curr = head as *mut VersionNode<T>;
        while !curr.is_null() {
            // SAFETY: the tail is exclusively owned by the reclaimer.
            let prev = unsafe { (*curr).prev.load(Ordering::Relaxed) };
            unsafe { VersionNode::destroy(curr) };
            curr = prev;
        }
    }
}

impl<T> Drop for TVar<T> {
    fn drop(&mut self) {
        // Exclusive access: no transaction can hold a reference to this
        // variable anymore, and retired tails are owned by the EBR layer.
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            // SAFETY: reachable chain nodes belong to this variable.
            let prev = unsafe { (*curr).prev.load(Ordering::Relaxed) };
            unsafe { VersionNode::destroy(curr) };
            curr = prev;
        }
    }
}
