//! Optimistic (TL2-style) variant.
//!
//! Reads are lock-free and validated against the global clock; writes are
//! buffered and published at commit under striped locks. The strict
//! validator aborts whenever a read cell gained a newer version after the
//! transaction began.
//!
//! # Example
//!
//! ```
//! use petek_stm::occ::{atomically, TVar};
//!
//! let counter = TVar::new(0);
//! atomically(|tx| {
//!     let v = tx.load(&counter)?;
//!     tx.store(&counter, v + 1)
//! });
//! assert_eq!(atomically(|tx| tx.load(&counter)), 1);
//! ```

use crate::errors::StmError;
use crate::runner;
use crate::tl2::Strict;

pub use crate::tl2::TVar;

/// An optimistic transaction with strict TL2 validation.
pub type Transaction<'g> = crate::tl2::Transaction<'g, Strict>;

/// Execute `f` atomically, retrying on conflict until it commits.
///
/// `Err(StmError::Retry)` from the closure restarts the attempt; any other
/// error is a bug at this level and panics after rollback. A panicking
/// closure also rolls back before unwinding.
pub fn atomically<F, T>(f: F) -> T
where
    F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
{
    runner::run::<Strict, F, T>(f)
}

/// Like [`atomically`], but user errors roll the transaction back and are
/// returned to the caller instead of panicking.
pub fn try_atomically<F, T>(f: F) -> Result<T, StmError>
where
    F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
{
    runner::try_run::<Strict, F, T>(f)
}
