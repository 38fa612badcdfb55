use crate::status::{RpcError, Status};

/// Why a guarded region was refused or interrupted.
///
/// Cloneable so a cancelled wrapper can hand the same error to every later
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// The call deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The call was cancelled explicitly.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The call was terminated with a status.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A second context tried to enter a region that is already armed.
    #[error("concurrent call detected (region held by owner {owner})")]
    ConcurrentUse { owner: u64 },
}

impl CancelError {
    /// Status a peer should observe for this error.
    pub fn status(&self) -> Status {
        match self {
            CancelError::DeadlineExceeded => Status::DeadlineExceeded,
            CancelError::Cancelled(_) => Status::Cancelled,
            CancelError::Rpc(err) => err.status,
            CancelError::ConcurrentUse { .. } => Status::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CancelError>;
