//! Process-wide chunk source: a bounded cache of free chunks in front of the
//! OS mapper. Chunks larger than [`CHUNK_SIZE`] are never cached.

use crate::config::{CHUNK_SIZE, MAX_CENTRAL_CACHE};
use crate::errors::AllocError;
use crate::sync::SpinLock;
use crate::sys;
use core::ptr::NonNull;

static CENTRAL: CentralHeap = CentralHeap::new();

pub struct CentralHeap {
    // Chunk bases stored as addresses; NonNull is not Send.
    free_chunks: SpinLock<Vec<usize>>,
}

impl CentralHeap {
    const fn new() -> Self {
        Self {
            free_chunks: SpinLock::new(Vec::new()),
        }
    }

    /// The process-wide instance.
    #[inline]
    pub fn get() -> &'static CentralHeap {
        &CENTRAL
    }

    /// Pop a cached chunk or map a fresh one.
    pub fn fetch_chunk(&self) -> Result<NonNull<u8>, AllocError> {
        if let Some(addr) = self.free_chunks.lock().pop() {
            // Cached addresses originate from map_chunk and are never null.
            return Ok(unsafe { NonNull::new_unchecked(addr as *mut u8) });
        }
        sys::map_chunk(CHUNK_SIZE).ok_or(AllocError::OutOfMemory)
    }

    /// Return a chunk of exactly [`CHUNK_SIZE`] bytes. Cached while there is
    /// room, otherwise unmapped.
    pub fn return_chunk(&self, chunk: NonNull<u8>) {
        debug_assert_eq!(chunk.as_ptr() as usize & (CHUNK_SIZE - 1), 0);
        {
            let mut cache = self.free_chunks.lock();
            if cache.len() < MAX_CENTRAL_CACHE {
                cache.push(chunk.as_ptr() as usize);
                return;
            }
        }
        // SAFETY: the chunk came from fetch_chunk and is no longer in use.
        unsafe { sys::unmap_chunk(chunk, CHUNK_SIZE) }
    }

    /// Chunk-aligned region for a large span. `bytes` must already be
    /// page-normalized. Regions of at most one chunk come from the cache.
    pub fn allocate_large(&self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        if bytes <= CHUNK_SIZE {
            return self.fetch_chunk();
        }
        sys::map_chunk(bytes).ok_or(AllocError::OutOfMemory)
    }

    /// Release a large span obtained from [`CentralHeap::allocate_large`].
    ///
    /// # Safety
    ///
    /// `ptr`/`bytes` must match a prior `allocate_large` and the span must
    /// no longer be referenced.
    pub unsafe fn free_large(&self, ptr: NonNull<u8>, bytes: usize) {
        if bytes <= CHUNK_SIZE {
            self.return_chunk(ptr);
        } else {
            // SAFETY: forwarded caller contract.
            unsafe { sys::unmap_chunk(ptr, bytes) }
        }
    }

    /// Number of chunks currently cached.
    pub fn free_chunk_count(&self) -> usize {
        self.free_chunks.lock().len()
    }
}
