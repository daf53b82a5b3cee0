//! Object-based Wound-Wait variant.
//!
//! Writers take cells eagerly: each write installs a record carrying the
//! owning descriptor, the superseded version, and the draft. Readers decide
//! visibility from the record owner's status. Conflicts between writers are
//! settled by age: the older transaction wounds the younger one, so the
//! oldest transaction in the system always makes progress.
//!
//! # Example
//!
//! ```
//! use petek_stm::ww::{atomically, TMVar};
//!
//! let counter = TMVar::new(0);
//! atomically(|tx| {
//!     let v = tx.load(&counter)?;
//!     tx.store(&counter, v + 1)
//! });
//! assert_eq!(atomically(|tx| tx.load(&counter)), 1);
//! ```

mod descriptor;
mod node;
mod record;
mod transaction;
mod var;

pub use transaction::Transaction;
pub use var::TMVar;

use crate::errors::StmError;
use log::debug;

/// Execute `f` atomically under Wound-Wait conflict resolution, retrying
/// until it commits. Wounds and conflicts surface internally as `Retry`;
/// any other error panics after rollback.
pub fn atomically<F, T>(f: F) -> T
where
    F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
{
    match try_atomically(f) {
        Ok(value) => value,
        Err(err) => panic!("transaction failed with error: {err}"),
    }
}

/// Like [`atomically`], but user errors roll the transaction back and are
/// returned to the caller instead of panicking.
pub fn try_atomically<F, T>(mut f: F) -> Result<T, StmError>
where
    F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
{
    let mut retries: u64 = 0;
    loop {
        {
            let guard = petek_ebr::pin();
            let mut tx = Transaction::new(&guard)?;
            match f(&mut tx) {
                Ok(value) => {
                    if tx.commit() {
                        return Ok(value);
                    }
                }
                Err(StmError::Retry) => {}
                // Dropping the unfinished transaction rolls it back before
                // the error escapes.
                Err(err) => return Err(err),
            }
        }

        retries += 1;
        if retries % 1000 == 0 {
            debug!("ww transaction retrying (attempt {retries})");
        }
        std::thread::yield_now();
    }
}
