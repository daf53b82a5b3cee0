//! Software transactional memory over the petek slab allocator.
//!
//! Three concurrency disciplines share one cell-and-transaction interface:
//!
//! - [`occ`]: optimistic TL2. Lock-free reads validated against a global
//!   version clock, writes published at commit under striped locks.
//! - [`lsa`]: lazy-snapshot MVCC. The same commit machinery, but a read
//!   stays valid while any version of its snapshot remains reachable in the
//!   cell's version chain.
//! - [`ww`]: object-based Wound-Wait. Writers take cells eagerly through
//!   write records; the older transaction always makes progress.
//!
//! Version nodes, write records, and descriptors live in
//! [`petek_alloc`] thread-heap memory and are reclaimed through
//! [`petek_ebr`], so a reader never touches freed memory no matter which
//! thread retired the node.
//!
//! # Example
//!
//! ```
//! use petek_stm::occ::{atomically, TVar};
//!
//! let a = TVar::new(100);
//! let b = TVar::new(0);
//!
//! // Transfer 30 from a to b, atomically.
//! atomically(|tx| {
//!     let x = tx.load(&a)?;
//!     let y = tx.load(&b)?;
//!     tx.store(&a, x - 30)?;
//!     tx.store(&b, y + 30)
//! });
//!
//! let sum = atomically(|tx| Ok(tx.load(&a)? + tx.load(&b)?));
//! assert_eq!(sum, 100);
//! ```

pub mod clock;
mod errors;
pub mod lock_table;
pub mod lsa;
pub mod occ;
mod runner;
mod tl2;
pub mod ww;

pub use errors::StmError;
pub use tl2::{Snapshot, Strict, Validation, MAX_HISTORY};
