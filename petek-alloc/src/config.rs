//! Compile-time tunables shared by the allocator and its clients.

/// Size of one chunk. Power of two; every chunk (and every large span) is
/// mapped at an address aligned to this, which is what lets `deallocate`
/// recover the owning chunk header by masking the low bits of any payload
/// pointer.
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Mask that maps any address inside a chunk to the chunk base.
pub const CHUNK_MASK: usize = !(CHUNK_SIZE - 1);

/// Cache line size assumed for padding and header alignment.
pub const CACHE_LINE: usize = 64;

/// Maximum number of free chunks retained in the central cache before
/// surplus chunks go back to the OS.
pub const MAX_CENTRAL_CACHE: usize = 64;

/// Upper bound on full-list rescue attempts per allocation before giving up
/// and fetching a fresh chunk.
pub const MAX_POOL_RESCUE_CHECKS: usize = 3;

/// Largest request served from size-classed slabs. Anything above goes to
/// the large-span path.
pub const MAX_ALLOC: usize = 256 * 1024;

/// Chunks cached per thread between the pools and the central cache.
pub const THREAD_CHUNK_CACHE: usize = 2;

/// Granularity of large-span normalization.
pub const PAGE_SIZE: usize = 4096;

/// Minimum alignment guaranteed by `allocate`.
pub const MIN_ALIGN: usize = 16;

/// Spin iterations a waiter burns on a contended internal lock before it
/// starts yielding its time slice. Internal critical sections (chunk cache
/// pushes, registry scans) are short, so the budget is small.
pub const LOCK_SPIN_LIMIT: usize = 64;
