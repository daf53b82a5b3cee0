use crate::errors::StmError;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU8, Ordering};
use petek_alloc::config::MIN_ALIGN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TxStatus {
    Active = 0,
    Committed = 1,
    Aborted = 2,
}

/// Per-attempt descriptor. Foreign threads reach it through the `owner`
/// slot of write records (to read its status during visibility decisions,
/// or to wound it), so it lives in thread-heap memory and is retired
/// through EBR once the attempt ends.
///
/// Both terminal states are sticky: the only transitions are the two CASes
/// below, and each requires the current status to be `Active`.
#[repr(C)]
pub(crate) struct TxDescriptor {
    status: AtomicU8,
    pub start_ts: u64,
}

impl TxDescriptor {
    pub(crate) fn create(start_ts: u64) -> Result<NonNull<Self>, StmError> {
        debug_assert!(core::mem::align_of::<Self>() <= MIN_ALIGN);
        let raw = petek_alloc::allocate(core::mem::size_of::<Self>())?.as_ptr() as *mut Self;
        // SAFETY: fresh block of the right size.
        unsafe {
            raw.write(Self {
                status: AtomicU8::new(TxStatus::Active as u8),
                start_ts,
            });
            Ok(NonNull::new_unchecked(raw))
        }
    }

    #[inline]
    pub(crate) fn status(&self) -> TxStatus {
        match self.status.load(Ordering::Acquire) {
            0 => TxStatus::Active,
            1 => TxStatus::Committed,
            _ => TxStatus::Aborted,
        }
    }

    /// `Active → Committed`. Fails if a wound landed first.
    #[inline]
    pub(crate) fn try_commit(&self) -> bool {
        self.status
            .compare_exchange(
                TxStatus::Active as u8,
                TxStatus::Committed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Active → Aborted`, by self or by an older wounding transaction.
    #[inline]
    pub(crate) fn try_abort(&self) -> bool {
        self.status
            .compare_exchange(
                TxStatus::Active as u8,
                TxStatus::Aborted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
