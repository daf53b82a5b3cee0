use crate::errors::StmError;
use core::ptr::NonNull;
use petek_alloc::config::MIN_ALIGN;

/// Committed (or staged) value of a Wound-Wait cell. Unlike the optimistic
/// engines there is no chain: a cell holds one current node plus at most one
/// in-flight draft inside a write record.
///
/// `write_ts` is stamped during commit, before the node is published with a
/// release store of the cell's `data` slot.
#[repr(C)]
pub(crate) struct WwNode<T> {
    pub write_ts: u64,
    pub payload: T,
}

impl<T> WwNode<T> {
    pub(crate) fn create(write_ts: u64, payload: T) -> Result<NonNull<Self>, StmError> {
        debug_assert!(core::mem::align_of::<Self>() <= MIN_ALIGN);
        let raw = petek_alloc::allocate(core::mem::size_of::<Self>())?.as_ptr() as *mut Self;
        // SAFETY: fresh block of the right size.
        unsafe {
            raw.write(Self { write_ts, payload });
            Ok(NonNull::new_unchecked(raw))
        }
    }

    /// # Safety
    ///
    /// `node` must come from [`WwNode::create`], be unpublished or otherwise
    /// unreachable, and not be destroyed twice.
    pub(crate) unsafe fn destroy(node: *mut Self) {
        // SAFETY: forwarded caller contract.
        unsafe {
            core::ptr::drop_in_place(node);
            petek_alloc::deallocate(NonNull::new_unchecked(node as *mut u8));
        }
    }
}
