//! Thread-caching slab allocator over 2 MiB aligned chunks.
//!
//! # Architecture
//!
//! - **Central heap**: a bounded cache of free chunks in front of the OS
//!   mapper. Every chunk is aligned to [`config::CHUNK_SIZE`], so any payload
//!   pointer can be masked down to its chunk header.
//! - **Size classes**: a pure map from request size to one of 96 rounded
//!   sizes (16 B … 256 KiB). Larger requests get a dedicated span.
//! - **Slabs**: one chunk carved into equal blocks of one class, with a bump
//!   region, an owner-only free list, and a lock-free remote-free stack.
//! - **Thread heap**: one pool of slabs per class in a thread-local; the
//!   `allocate`/`deallocate` front door routes by chunk header and owner.
//!
//! Allocation is thread-affine; deallocation works from any thread. Frees
//! from foreign threads land on the owning slab's remote stack and become
//! allocatable again after the owner's next drain.
//!
//! ```
//! let p = petek_alloc::allocate(40).unwrap();
//! // SAFETY: p came from allocate and is freed exactly once.
//! unsafe { petek_alloc::deallocate(p) };
//! ```

pub mod config;
mod central;
mod errors;
mod heap;
mod list;
mod pool;
mod size_class;
mod slab;
mod sync;
mod sys;

pub use central::CentralHeap;
pub use errors::AllocError;
pub use heap::{allocate, deallocate};
pub use size_class::{class_to_size, normalize, size_to_class, CLASS_COUNT};
pub use slab::{ChunkHeader, ChunkKind};
pub use sync::{CacheAligned, SpinGuard, SpinLock};
