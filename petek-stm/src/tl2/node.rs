use crate::errors::StmError;
use core::ptr::NonNull;
use core::sync::atomic::AtomicPtr;
use petek_alloc::config::MIN_ALIGN;

/// One link of a cell's version chain. Lives in thread-heap memory so that
/// retirement from any thread routes through the slab remote-free path.
///
/// `write_ts` is written once, under the committer's stripe lock, before the
/// node is published with a release store; readers only see it through an
/// acquire load of `head` or `prev`.
#[repr(C)]
pub(crate) struct VersionNode<T> {
    pub write_ts: u64,
    pub prev: AtomicPtr<VersionNode<T>>,
    pub payload: T,
}

impl<T> VersionNode<T> {
    pub(crate) fn create(
        write_ts: u64,
        prev: *mut VersionNode<T>,
        payload: T,
    ) -> Result<NonNull<Self>, StmError> {
        debug_assert!(core::mem::align_of::<Self>() <= MIN_ALIGN);
        let raw = petek_alloc::allocate(core::mem::size_of::<Self>())?.as_ptr() as *mut Self;
        // SAFETY: fresh block of the right size.
        unsafe {
            raw.write(Self {
                write_ts,
                prev: AtomicPtr::new(prev),
                payload,
            });
            Ok(NonNull::new_unchecked(raw))
        }
    }

    /// Drop the payload and return the block to the thread heap.
    ///
    /// # Safety
    ///
    /// `node` must come from [`VersionNode::create`], be unreachable, and
    /// not be destroyed twice.
    pub(crate) unsafe fn destroy(node: *mut Self) {
        // SAFETY: forwarded caller contract.
        unsafe {
            core::ptr::drop_in_place(node);
            petek_alloc::deallocate(NonNull::new_unchecked(node as *mut u8));
        }
    }
}
