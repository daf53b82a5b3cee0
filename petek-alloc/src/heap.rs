//! The per-thread heap and the crate's front door.
//!
//! `allocate` is thread-affine: blocks come from slabs owned by the calling
//! thread. `deallocate` may be called from any thread; it recovers the chunk
//! header by masking and routes to the owner's local free list or to the
//! slab's lock-free remote stack.

use crate::central::CentralHeap;
use crate::config::{CACHE_LINE, CHUNK_MASK, CHUNK_SIZE};
use crate::errors::AllocError;
use crate::pool::{SizeClassPool, ThreadChunkCache};
use crate::size_class::{normalize, size_to_class, CLASS_COUNT};
use crate::slab::{ChunkHeader, ChunkKind, Slab, Span};
use core::cell::RefCell;
use core::ptr::NonNull;
use log::debug;

pub struct ThreadHeap {
    chunk_cache: ThreadChunkCache,
    pools: [SizeClassPool; CLASS_COUNT],
}

impl ThreadHeap {
    fn new() -> Self {
        Self {
            chunk_cache: ThreadChunkCache::new(),
            pools: core::array::from_fn(SizeClassPool::new),
        }
    }

    fn allocate_small(&mut self, heap_id: usize, class: usize) -> Result<NonNull<u8>, AllocError> {
        let Self { chunk_cache, pools } = self;
        pools[class].allocate(heap_id, chunk_cache)
    }

    /// # Safety
    ///
    /// `slab` must be owned by this heap and `ptr` must be a live block of it.
    unsafe fn deallocate_owned(&mut self, slab: NonNull<Slab>, ptr: NonNull<u8>) {
        let Self { chunk_cache, pools } = self;
        // SAFETY: forwarded caller contract.
        let class = unsafe { slab.as_ref().class } as usize;
        unsafe { pools[class].deallocate(slab, ptr, chunk_cache) }
    }
}

impl Drop for ThreadHeap {
    fn drop(&mut self) {
        // Safe-leak teardown: every slab is returned to the central cache,
        // including slabs whose blocks are still held by other threads.
        // Those blocks are not rescued.
        let mut live = 0;
        for pool in &mut self.pools {
            live += pool.teardown();
        }
        self.chunk_cache.drain();
        if live > 0 {
            debug!("thread heap exit returned {live} slab(s) with live cross-thread blocks");
        }
    }
}

thread_local! {
    static HEAP: RefCell<ThreadHeap> = RefCell::new(ThreadHeap::new());
}

/// Allocate `nbytes` of uninitialized memory, aligned to at least 16.
///
/// Thread-affine: the returned block belongs to a slab owned by the calling
/// thread (or to a dedicated large span). Free it with [`deallocate`], from
/// any thread.
pub fn allocate(nbytes: usize) -> Result<NonNull<u8>, AllocError> {
    let nbytes = nbytes.max(1);

    if let Some(class) = size_to_class(nbytes) {
        return HEAP
            .try_with(|heap| {
                let heap_id = heap.as_ptr() as usize;
                heap.borrow_mut().allocate_small(heap_id, class)
            })
            // TLS destroyed during thread teardown: no pools to serve from.
            .unwrap_or(Err(AllocError::OutOfMemory));
    }

    allocate_large(nbytes)
}

fn allocate_large(nbytes: usize) -> Result<NonNull<u8>, AllocError> {
    let central = CentralHeap::get();
    let total = CACHE_LINE + nbytes;
    let (base, span_bytes) = if total <= CHUNK_SIZE {
        (central.fetch_chunk()?, CHUNK_SIZE)
    } else {
        let bytes = normalize(total);
        (central.allocate_large(bytes)?, bytes)
    };
    // SAFETY: fresh chunk-aligned region, exclusively ours.
    let span = unsafe { Span::create_at(base, span_bytes) };
    Ok(Span::payload(span))
}

/// Free a block previously returned by [`allocate`]. Any thread may call
/// this; cross-thread frees land on the owning slab's remote stack.
///
/// # Safety
///
/// `ptr` must come from [`allocate`] in this process and must not be freed
/// twice or used afterwards.
pub unsafe fn deallocate(ptr: NonNull<u8>) {
    let header = ChunkHeader::of(ptr.as_ptr());
    // SAFETY: allocate installed a header at the chunk base.
    match unsafe { (*header).kind } {
        ChunkKind::Large => {
            let base = (ptr.as_ptr() as usize & CHUNK_MASK) as *mut u8;
            // SAFETY: Large chunks start with a Span header.
            let bytes = unsafe { (*(base as *mut Span)).total_bytes };
            // SAFETY: span is dead; base/bytes match its creation.
            unsafe {
                CentralHeap::get().free_large(NonNull::new_unchecked(base), bytes);
            }
        }
        ChunkKind::Small => {
            // SAFETY: Small chunks start with a Slab header.
            let slab = unsafe { Slab::of(ptr.as_ptr()) };
            let owner = unsafe { slab.as_ref().owner_heap };

            let freed_locally = HEAP
                .try_with(|heap| {
                    if heap.as_ptr() as usize != owner {
                        return false;
                    }
                    // SAFETY: owner matches, so this heap owns the slab and
                    // the caller vouches for the block.
                    unsafe { heap.borrow_mut().deallocate_owned(slab, ptr) };
                    true
                })
                .unwrap_or(false);

            if !freed_locally {
                // SAFETY: remote push only touches the block's first word
                // and the slab's remote stack.
                unsafe { slab.as_ref().free_remote(ptr) };
            }
        }
    }
}
