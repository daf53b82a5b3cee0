//! Per-thread pool of slabs for one size class, plus the small per-thread
//! chunk cache that mediates between the pools and the central heap.

use crate::central::CentralHeap;
use crate::config::{MAX_POOL_RESCUE_CHECKS, THREAD_CHUNK_CACHE};
use crate::errors::AllocError;
use crate::list::SlabList;
use crate::size_class::class_to_size;
use crate::slab::Slab;
use core::ptr::NonNull;

/// Thread-local cache of a couple of chunks so a pool churning on the
/// empty/non-empty boundary does not hammer the central lock.
pub struct ThreadChunkCache {
    chunks: Vec<NonNull<u8>>,
}

impl ThreadChunkCache {
    pub fn new() -> Self {
        Self {
            chunks: Vec::with_capacity(THREAD_CHUNK_CACHE),
        }
    }

    pub fn fetch_chunk(&mut self) -> Result<NonNull<u8>, AllocError> {
        match self.chunks.pop() {
            Some(chunk) => Ok(chunk),
            None => CentralHeap::get().fetch_chunk(),
        }
    }

    pub fn return_chunk(&mut self, chunk: NonNull<u8>) {
        if self.chunks.len() < THREAD_CHUNK_CACHE {
            self.chunks.push(chunk);
        } else {
            CentralHeap::get().return_chunk(chunk);
        }
    }

    /// Hand every cached chunk back to the central heap.
    pub fn drain(&mut self) {
        for chunk in self.chunks.drain(..) {
            CentralHeap::get().return_chunk(chunk);
        }
    }
}

impl Default for ThreadChunkCache {
    fn default() -> Self {
        Self::new()
    }
}

/// One size class worth of slabs: the current slab being carved, a list of
/// partial slabs with known free space, and a list of full slabs that may be
/// rescued by draining their remote-free stacks.
pub struct SizeClassPool {
    class: u32,
    block_size: u32,
    current: Option<NonNull<Slab>>,
    partial: SlabList,
    full: SlabList,
}

impl SizeClassPool {
    pub fn new(class: usize) -> Self {
        Self {
            class: class as u32,
            block_size: class_to_size(class) as u32,
            current: None,
            partial: SlabList::new(),
            full: SlabList::new(),
        }
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Allocate one block. `owner_heap` tags freshly created slabs so
    /// `deallocate` can route frees back here.
    pub fn allocate(
        &mut self,
        owner_heap: usize,
        cache: &mut ThreadChunkCache,
    ) -> Result<NonNull<u8>, AllocError> {
        if let Some(mut current) = self.current {
            // SAFETY: current slabs are owned by this pool.
            if let Some(block) = unsafe { current.as_mut().allocate() } {
                return Ok(block);
            }
            self.full.push_back(current);
            self.current = None;
        }

        if let Some(block) = self.allocate_from_partial() {
            return Ok(block);
        }

        if let Some(block) = self.allocate_from_rescue() {
            return Ok(block);
        }

        self.allocate_from_new(owner_heap, cache)
    }

    fn allocate_from_partial(&mut self) -> Option<NonNull<u8>> {
        let mut slab = self.partial.pop_front()?;
        self.current = Some(slab);
        // SAFETY: partial slabs are owned by this pool and have free space.
        unsafe { slab.as_mut().allocate() }
    }

    /// Scan the head of the full list for slabs whose remote stacks have
    /// accumulated frees, rotating failures to the tail. Bounded so a long
    /// full list cannot stall the allocation path.
    fn allocate_from_rescue(&mut self) -> Option<NonNull<u8>> {
        let mut checks = 0;
        while !self.full.is_empty() && checks < MAX_POOL_RESCUE_CHECKS {
            let mut victim = self.full.front()?;
            // SAFETY: slabs on the full list are owned by this pool.
            if unsafe { victim.as_mut().drain_remote() } > 0 {
                self.full.remove(victim);
                self.current = Some(victim);
                // SAFETY: the drain just gave the slab free blocks.
                return unsafe { victim.as_mut().allocate() };
            }
            self.full.move_head_to_tail();
            checks += 1;
        }
        None
    }

    fn allocate_from_new(
        &mut self,
        owner_heap: usize,
        cache: &mut ThreadChunkCache,
    ) -> Result<NonNull<u8>, AllocError> {
        let chunk = cache.fetch_chunk()?;
        // SAFETY: fresh chunk, exclusively ours.
        let mut slab = unsafe { Slab::create_at(chunk, owner_heap, self.class, self.block_size) };
        self.current = Some(slab);
        // SAFETY: a fresh slab always has bump space.
        unsafe { slab.as_mut().allocate() }.ok_or(AllocError::OutOfMemory)
    }

    /// Owner-thread free of `ptr` into `slab`, with list migration and
    /// empty-slab reclamation.
    ///
    /// # Safety
    ///
    /// `slab` must belong to this pool and `ptr` must be a live block of it.
    pub unsafe fn deallocate(
        &mut self,
        mut slab: NonNull<Slab>,
        ptr: NonNull<u8>,
        cache: &mut ThreadChunkCache,
    ) {
        let is_current = self.current == Some(slab);
        // SAFETY: pool owns the slab per the caller contract.
        let (was_full, now_empty) = unsafe {
            let s = slab.as_mut();
            let was_full = s.is_full();
            (was_full, s.free_local(ptr))
        };

        if now_empty {
            // SAFETY: pool owns the slab.
            if unsafe { slab.as_mut().drain_remote() } > 0 {
                if was_full {
                    self.full.remove(slab);
                    self.partial.push_front(slab);
                }
                return;
            }
            if is_current {
                self.current = None;
            } else if was_full {
                self.full.remove(slab);
            } else {
                self.partial.remove(slab);
            }
            cache.return_chunk(slab.cast());
            return;
        }

        if was_full && !is_current {
            self.full.remove(slab);
            self.partial.push_front(slab);
        }
    }

    /// Thread-exit teardown: every owned slab goes straight back to the
    /// central chunk cache, live blocks included (safe-leak). Outstanding
    /// cross-thread pointers into those chunks are not rescued; the blocks
    /// they name are never individually reclaimed. Returns how many slabs
    /// were returned while still holding live blocks.
    pub fn teardown(&mut self) -> usize {
        let mut live = 0;
        let central = CentralHeap::get();

        let mut release = |mut slab: NonNull<Slab>| {
            // SAFETY: teardown runs on the owner thread; the slab is off
            // every list by the time we get here.
            unsafe {
                slab.as_mut().drain_remote();
                if !slab.as_ref().is_empty() {
                    live += 1;
                }
            }
            central.return_chunk(slab.cast());
        };

        if let Some(current) = self.current.take() {
            release(current);
        }
        while let Some(slab) = self.partial.pop_front() {
            release(slab);
        }
        while let Some(slab) = self.full.pop_front() {
            release(slab);
        }
        live
    }
}
