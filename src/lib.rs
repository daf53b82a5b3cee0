//! Petek: software transactional memory on a thread-caching slab allocator.
//!
//! This crate re-exports the three subsystem crates:
//!
//! - [`alloc`]: size-classed slab allocator over 2 MiB aligned chunks,
//!   with lock-free cross-thread frees.
//! - [`ebr`]: three-generation epoch-based reclamation.
//! - [`stm`]: the transaction engines, optimistic TL2 ([`stm::occ`]),
//!   lazy-snapshot MVCC ([`stm::lsa`]), and object-based Wound-Wait
//!   ([`stm::ww`]).
//!
//! # Example
//!
//! ```
//! use petek::stm::occ::{atomically, TVar};
//!
//! let counter = TVar::new(0);
//! atomically(|tx| {
//!     let v = tx.load(&counter)?;
//!     tx.store(&counter, v + 1)
//! });
//! assert_eq!(atomically(|tx| tx.load(&counter)), 1);
//! ```

pub use petek_alloc as alloc;
pub use petek_ebr as ebr;
pub use petek_stm as stm;
