//! Retry loop shared by the optimistic variants.

use crate::errors::StmError;
use crate::tl2::{Transaction, Validation};
use log::debug;

/// Run `f` atomically, propagating user errors after rollback. `Retry` and
/// failed commits restart the attempt with a fresh read version.
pub(crate) fn try_run<V, F, T>(mut f: F) -> Result<T, StmError>
where
    V: Validation,
    F: FnMut(&mut Transaction<'_, V>) -> Result<T, StmError>,
{
    let mut retries: u64 = 0;
    loop {
        {
            // The guard pins the epoch for the whole attempt: every version
            // node loaded below stays alive until the attempt ends.
            let guard = petek_ebr::pin();
            let mut tx = Transaction::<V>::new(&guard);
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
            debug!("{} transaction retrying (attempt {retries})", V::NAME);
        }
        std::thread::yield_now();
    }
}

/// Run `f` atomically. User errors are programming mistakes at this level;
/// use `try_atomically` to receive them instead.
pub(crate) fn run<V, F, T>(f: F) -> T
where
    V: Validation,
    F: FnMut(&mut Transaction<'_, V>) -> Result<T, StmError>,
{
    match try_run(f) {
        Ok(value) => value,
        Err(err) => panic!("transaction failed with error: {err}"),
    }
}
