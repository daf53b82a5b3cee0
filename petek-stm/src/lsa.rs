//! Lazy-snapshot MVCC variant.
//!
//! Same commit machinery as [`occ`](crate::occ), but the validator walks the
//! version chain: a read set entry stays valid while any version visible at
//! the transaction's read version remains reachable. Long-running readers
//! survive concurrent commits as long as the history window
//! ([`MAX_HISTORY`](crate::MAX_HISTORY)) has not trimmed their snapshot
//! away; a trimmed snapshot surfaces as an internal `Retry`.

use crate::errors::StmError;
use crate::runner;
use crate::tl2::Snapshot;

pub use crate::tl2::TVar;

/// A lazy-snapshot transaction.
pub type Transaction<'g> = crate::tl2::Transaction<'g, Snapshot>;

/// Execute `f` atomically under snapshot validation.
pub fn atomically<F, T>(f: F) -> T
where
    F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
{
    runner::run::<Snapshot, F, T>(f)
}

/// Like [`atomically`], but user errors roll the transaction back and are
/// returned to the caller instead of panicking.
pub fn try_atomically<F, T>(f: F) -> Result<T, StmError>
where
    F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
{
    runner::try_run::<Snapshot, F, T>(f)
}
