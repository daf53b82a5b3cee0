use super::descriptor::TxDescriptor;
use super::node::WwNode;
use crate::errors::StmError;
use core::ptr::NonNull;
use core::sync::atomic::AtomicPtr;
use petek_alloc::config::MIN_ALIGN;

/// Pending write: exists only while some cell's `record` slot points at it.
/// `owner` never changes; `old`/`new` are atomics because foreign readers
/// chase them while the owner may still be replacing its draft.
#[repr(C)]
pub(crate) struct WriteRecord<T> {
    pub owner: *mut TxDescriptor,
    pub old: AtomicPtr<WwNode<T>>,
    pub new: AtomicPtr<WwNode<T>>,
}

impl<T> WriteRecord<T> {
    pub(crate) fn create(
        owner: *mut TxDescriptor,
        new: *mut WwNode<T>,
    ) -> Result<NonNull<Self>, StmError> {
        debug_assert!(core::mem::align_of::<Self>() <= MIN_ALIGN);
        let raw = petek_alloc::allocate(core::mem::size_of::<Self>())?.as_ptr() as *mut Self;
        // SAFETY: fresh block of the right size.
        unsafe {
            raw.write(Self {
                owner,
                old: AtomicPtr::new(core::ptr::null_mut()),
                new: AtomicPtr::new(new),
            });
            Ok(NonNull::new_unchecked(raw))
        }
    }

    /// Free the record shell alone; the nodes it points at are managed by
    /// the caller.
    ///
    /// # Safety
    ///
    /// `record` must never have been published to a cell's `record` slot
    /// (or have been unpublished with exclusive ownership re-established).
    pub(crate) unsafe fn destroy_shell(record: *mut Self) {
        // SAFETY: forwarded caller contract; the shell has no drop glue.
        unsafe { petek_alloc::deallocate(NonNull::new_unchecked(record as *mut u8)) }
    }
}
