//! Epoch-based reclamation for the transactional runtime.
//!
//! Three-generation EBR: a global epoch counter, a per-thread
//! `{active, local_epoch}` announcement, and three retire bins per thread
//! indexed by `epoch mod 3`. An object retired in epoch `e` is freed no
//! earlier than the moment every then-active thread has observed `e + 2`:
//! after two full grace periods, no reader can still hold it.
//!
//! Advancement is best-effort: a stalled reader only delays reclamation,
//! never correctness. Retire bins grow until the stall clears.
//!
//! # Example
//!
//! ```
//! let guard = petek_ebr::pin();
//! let node = Box::into_raw(Box::new(42u64));
//! // ... unlink `node` from the shared structure ...
//! // SAFETY: node is unlinked and retired exactly once.
//! unsafe { petek_ebr::retire_boxed(node) };
//! drop(guard);
//! petek_ebr::flush();
//! ```

mod guard;
mod registry;

pub use guard::{flush, pin, retire, retire_boxed, retire_heap, Guard};
pub use registry::{global_epoch, try_advance};
