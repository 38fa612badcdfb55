use rpcprims_call::{CancelError, DeadlineHeaderError, RpcError};
use rpcprims_events::BoxError;
use rpcprims_frame::FrameError;
use rpcprims_transport::TransportError;

/// Errors that can occur while serving or issuing calls.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The call was cancelled or hit its deadline.
    #[error("{0}")]
    Cancel(#[from] CancelError),

    /// The request head carried a malformed timeout.
    #[error("invalid request timeout: {0}")]
    DeadlineHeader(#[from] DeadlineHeaderError),

    /// An event listener failed; the error is passed through as returned.
    #[error("{0}")]
    Listener(#[source] BoxError),

    /// The handler ended the call with a status.
    #[error("{0}")]
    Rpc(#[from] RpcError),

    /// The connection closed before a request head arrived.
    #[error("connection closed before request head")]
    MissingHead,

    /// `start` was called on a server that is already running.
    #[error("server already started")]
    AlreadyStarted,

    /// Installing a signal handler failed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl ServerError {
    /// The cancellation error behind this failure, if any.
    pub fn as_cancel(&self) -> Option<&CancelError> {
        match self {
            ServerError::Cancel(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
