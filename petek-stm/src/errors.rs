use petek_alloc::AllocError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StmError {
    /// The transaction observed an inconsistent state and must be retried.
    /// Never surfaced to users: the `atomically` runners consume it.
    #[error("transaction retry required")]
    Retry,

    /// The thread heap could not satisfy an allocation.
    #[error("out of memory inside transaction")]
    OutOfMemory,

    /// A user-level abort. The transaction is rolled back before this
    /// propagates out of `try_atomically`.
    #[error("transaction error: {0}")]
    User(String),
}

impl From<AllocError> for StmError {
    fn from(_: AllocError) -> Self {
        StmError::OutOfMemory
    }
}
