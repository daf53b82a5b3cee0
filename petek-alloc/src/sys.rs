//! Chunk-aligned memory from the OS.
//!
//! Every region handed out here is aligned to [`CHUNK_SIZE`], which is the
//! contract the masking trick in `deallocate` depends on. On unix we map a
//! window one chunk larger than requested and trim the misaligned head and
//! tail; elsewhere we fall back to the global allocator with an explicit
//! alignment.

use crate::config::CHUNK_SIZE;
use core::ptr::NonNull;

#[cfg(unix)]
pub fn map_chunk(bytes: usize) -> Option<NonNull<u8>> {
    debug_assert!(bytes > 0 && bytes % crate::config::PAGE_SIZE == 0);
    let total = bytes + CHUNK_SIZE;

    // SAFETY: anonymous private mapping, no fd, no fixed address.
    let raw = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            total,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return None;
    }

    let addr = raw as usize;
    let aligned = (addr + CHUNK_SIZE - 1) & !(CHUNK_SIZE - 1);
    let head = aligned - addr;
    let tail = total - head - bytes;

    // SAFETY: head/tail are sub-ranges of the mapping we just created.
    unsafe {
        if head > 0 {
            libc::munmap(raw, head);
        }
        if tail > 0 {
            libc::munmap((aligned + bytes) as *mut libc::c_void, tail);
        }
    }

    NonNull::new(aligned as *mut u8)
}

/// # Safety
///
/// `ptr` must be a region of exactly `bytes` bytes previously returned by
/// [`map_chunk`] with the same size, and must not be accessed afterwards.
#[cfg(unix)]
pub unsafe fn unmap_chunk(ptr: NonNull<u8>, bytes: usize) {
    // SAFETY: caller passes a region obtained from map_chunk.
    unsafe {
        libc::munmap(ptr.as_ptr() as *mut libc::c_void, bytes);
    }
}

#[cfg(not(unix))]
pub fn map_chunk(bytes: usize) -> Option<NonNull<u8>> {
    let layout = core::alloc::Layout::from_size_align(bytes, CHUNK_SIZE).ok()?;
    // SAFETY: layout has non-zero size.
    NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })
}

/// # Safety
///
/// `ptr` must be a region of exactly `bytes` bytes previously returned by
/// [`map_chunk`] with the same size, and must not be accessed afterwards.
#[cfg(not(unix))]
pub unsafe fn unmap_chunk(ptr: NonNull<u8>, bytes: usize) {
    let layout = core::alloc::Layout::from_size_align(bytes, CHUNK_SIZE)
        .expect("layout valid by construction");
    // SAFETY: caller passes a region obtained from map_chunk with this size.
    unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
}
