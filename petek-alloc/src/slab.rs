//! Chunk headers, large spans, and the slab itself.
//!
//! A slab is a chunk reinterpreted as a header followed by an array of
//! equal-size blocks. All fields except `remote_free` are owner-thread only;
//! `remote_free` is a lock-free Treiber stack that foreign threads push
//! freed blocks onto. Free blocks thread the next pointer through their
//! first word.

use crate::config::{CACHE_LINE, CHUNK_MASK, CHUNK_SIZE};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};

/// Discriminates what lives at a chunk base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkKind {
    /// A [`Slab`] of size-classed blocks.
    Small = 0,
    /// A [`Span`] holding a single large allocation.
    Large = 1,
}

/// First bytes of every chunk. `Slab` and `Span` both start with this, so
/// masking a payload pointer down to the chunk base always yields a valid
/// header to dispatch on.
#[repr(C)]
pub struct ChunkHeader {
    pub kind: ChunkKind,
}

impl ChunkHeader {
    /// Recover the header of the chunk containing `ptr`.
    #[inline]
    pub fn of(ptr: *mut u8) -> *mut ChunkHeader {
        (ptr as usize & CHUNK_MASK) as *mut ChunkHeader
    }
}

/// Header of a single-object span. The payload starts one cache line past
/// the base so the header never aliases user data.
#[repr(C)]
pub struct Span {
    pub header: ChunkHeader,
    /// Total mapped bytes including this header.
    pub total_bytes: usize,
}

impl Span {
    /// Placement-initialize a span header at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be a chunk-aligned region of at least `total_bytes` bytes
    /// with no other live object at its base.
    pub unsafe fn create_at(base: NonNull<u8>, total_bytes: usize) -> NonNull<Span> {
        let span = base.as_ptr() as *mut Span;
        // SAFETY: caller hands us exclusive ownership of the region.
        unsafe {
            ptr::write(
                span,
                Span {
                    header: ChunkHeader {
                        kind: ChunkKind::Large,
                    },
                    total_bytes,
                },
            );
            NonNull::new_unchecked(span)
        }
    }

    /// Payload pointer for this span.
    #[inline]
    pub fn payload(span: NonNull<Span>) -> NonNull<u8> {
        // SAFETY: spans are at least CACHE_LINE + 1 bytes by construction.
        unsafe { NonNull::new_unchecked((span.as_ptr() as *mut u8).add(CACHE_LINE)) }
    }
}

/// Slab metadata at the base of a `Small` chunk.
#[repr(C)]
pub struct Slab {
    pub header: ChunkHeader,
    /// Address of the owning `ThreadHeap`, used by `deallocate` to decide
    /// between the local and the remote free path.
    pub owner_heap: usize,
    /// Size-class index of every block in this slab.
    pub class: u32,
    pub block_size: u32,
    /// Intrusive hooks for the owning pool's partial/full lists.
    pub prev: *mut Slab,
    pub next: *mut Slab,
    /// Unused tail region for first-time allocation.
    bump: *mut u8,
    end: *mut u8,
    /// Owner-only free list threaded through freed blocks.
    local_free: *mut u8,
    /// Foreign-thread free stack. The only field written concurrently.
    remote_free: AtomicPtr<u8>,
    allocated: u32,
    max_blocks: u32,
}

impl Slab {
    /// Placement-initialize a slab over `chunk`. Blocks are not pre-threaded;
    /// the bump region starts at the first cache line past the header.
    ///
    /// # Safety
    ///
    /// `chunk` must be a `CHUNK_SIZE`-aligned region of `CHUNK_SIZE` bytes
    /// exclusively owned by the caller.
    pub unsafe fn create_at(
        chunk: NonNull<u8>,
        owner_heap: usize,
        class: u32,
        block_size: u32,
    ) -> NonNull<Slab> {
        debug_assert!(block_size as usize >= core::mem::size_of::<*mut u8>());
        debug_assert_eq!(chunk.as_ptr() as usize & !CHUNK_MASK, 0);

        let base = chunk.as_ptr();
        let head = (core::mem::size_of::<Slab>() + CACHE_LINE - 1) & !(CACHE_LINE - 1);
        let avail = CHUNK_SIZE - head;

        let slab = base as *mut Slab;
        // SAFETY: region is exclusively ours and large enough for the header.
        unsafe {
            ptr::write(
                slab,
                Slab {
                    header: ChunkHeader {
                        kind: ChunkKind::Small,
                    },
                    owner_heap,
                    class,
                    block_size,
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                    bump: base.add(head),
                    end: base.add(CHUNK_SIZE),
                    local_free: ptr::null_mut(),
                    remote_free: AtomicPtr::new(ptr::null_mut()),
                    allocated: 0,
                    max_blocks: (avail / block_size as usize) as u32,
                },
            );
            NonNull::new_unchecked(slab)
        }
    }

    /// Recover the slab containing `ptr`.
    ///
    /// # Safety
    ///
    /// The chunk containing `ptr` must hold a live `Small` header.
    #[inline]
    pub unsafe fn of(ptr: *mut u8) -> NonNull<Slab> {
        // SAFETY: chunk bases are never null.
        unsafe { NonNull::new_unchecked((ptr as usize & CHUNK_MASK) as *mut Slab) }
    }

    /// Owner-only allocation: local free list, then bump, then a remote
    /// drain retry.
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        if !self.local_free.is_null() {
            let block = self.local_free;
            // SAFETY: free blocks store the next pointer in their first word.
            self.local_free = unsafe { *(block as *mut *mut u8) };
            self.allocated += 1;
            return NonNull::new(block);
        }

        if (self.bump as usize) + self.block_size as usize <= self.end as usize {
            let block = self.bump;
            // SAFETY: bump stays within the chunk, checked above.
            self.bump = unsafe { self.bump.add(self.block_size as usize) };
            self.allocated += 1;
            return NonNull::new(block);
        }

        if self.drain_remote() > 0 {
            return self.allocate();
        }

        None
    }

    /// Owner-only free. Returns whether the slab is now empty.
    pub fn free_local(&mut self, ptr: NonNull<u8>) -> bool {
        // SAFETY: the block is dead; its first word becomes the list link.
        unsafe {
            *(ptr.as_ptr() as *mut *mut u8) = self.local_free;
        }
        self.local_free = ptr.as_ptr();
        self.allocated -= 1;
        self.allocated == 0
    }

    /// Foreign-thread free: lock-free push onto the remote stack. Never
    /// touches `allocated`; the owner reconciles in [`Slab::drain_remote`].
    pub fn free_remote(&self, ptr: NonNull<u8>) {
        let block = ptr.as_ptr();
        let mut head = self.remote_free.load(Ordering::Relaxed);
        loop {
            // SAFETY: the block is dead; its first word becomes the link.
            unsafe {
                *(block as *mut *mut u8) = head;
            }
            match self
                .remote_free
                .compare_exchange_weak(head, block, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Owner-only: steal the whole remote stack, splice it onto the local
    /// list, and reconcile `allocated`. Returns the number of blocks drained.
    pub fn drain_remote(&mut self) -> u32 {
        let head = self.remote_free.swap(ptr::null_mut(), Ordering::Acquire);
        if head.is_null() {
            return 0;
        }

        let mut count = 0u32;
        let mut curr = head;
        let mut tail = head;
        while !curr.is_null() {
            tail = curr;
            count += 1;
            // SAFETY: every stack entry links through its first word.
            curr = unsafe { *(curr as *mut *mut u8) };
        }

        // SAFETY: tail is the last live entry of the stolen chain.
        unsafe {
            *(tail as *mut *mut u8) = self.local_free;
        }
        self.local_free = head;
        self.allocated -= count;
        count
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.allocated == self.max_blocks
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    #[inline]
    pub fn max_blocks(&self) -> u32 {
        self.max_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::CentralHeap;

    fn with_slab(block_size: u32, f: impl FnOnce(&mut Slab)) {
        let chunk = CentralHeap::get().fetch_chunk().expect("chunk");
        // SAFETY: fresh exclusive chunk.
        let mut slab = unsafe { Slab::create_at(chunk, 0, 0, block_size) };
        // SAFETY: create_at returned a valid slab we exclusively own.
        f(unsafe { slab.as_mut() });
        CentralHeap::get().return_chunk(chunk);
    }

    #[test]
    fn bump_then_free_then_reuse() {
        with_slab(64, |slab| {
            let a = slab.allocate().unwrap();
            let b = slab.allocate().unwrap();
            assert_ne!(a, b);
            assert_eq!(slab.allocated(), 2);

            assert!(!slab.free_local(a));
            assert!(slab.free_local(b));
            assert!(slab.is_empty());

            // Freed blocks come back LIFO.
            assert_eq!(slab.allocate().unwrap(), b);
            assert_eq!(slab.allocate().unwrap(), a);
        });
    }

    #[test]
    fn remote_free_reconciles_on_drain() {
        with_slab(128, |slab| {
            let a = slab.allocate().unwrap();
            let b = slab.allocate().unwrap();
            slab.free_remote(a);
            slab.free_remote(b);
            // Remote frees are invisible until drained.
            assert_eq!(slab.allocated(), 2);
            assert_eq!(slab.drain_remote(), 2);
            assert!(slab.is_empty());
        });
    }

    #[test]
    fn exhaustion_returns_none() {
        with_slab((CHUNK_SIZE / 4) as u32, |slab| {
            let mut blocks = Vec::new();
            while let Some(p) = slab.allocate() {
                blocks.push(p);
            }
            assert_eq!(blocks.len() as u32, slab.max_blocks());
            assert!(slab.is_full());
            for p in blocks {
                slab.free_local(p);
            }
        });
    }
}
