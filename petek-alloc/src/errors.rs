use thiserror::Error;

/// Allocation failures surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The OS refused a mapping and every cache was empty.
    #[error("out of memory: chunk source exhausted")]
    OutOfMemory,
}
