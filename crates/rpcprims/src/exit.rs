use std::fmt;
use std::io;

use rpcprims_call::{CancelError, RpcError, Status};
use rpcprims_frame::FrameError;
use rpcprims_server::ServerError;
use rpcprims_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

/// Base for signal exits: a process stopped by signal `n` exits with `128 + n`.
pub const SIGNAL_BASE: i32 = 128;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        io::ErrorKind::AddrInUse
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidEndpoint(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Codec(_) | FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    let code = match err.status {
        Status::DeadlineExceeded => TIMEOUT,
        Status::Unavailable => TRANSPORT_ERROR,
        Status::InvalidArgument => DATA_INVALID,
        Status::PermissionDenied | Status::Unauthenticated => PERMISSION_DENIED,
        Status::Internal => INTERNAL,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn cancel_error(context: &str, err: CancelError) -> CliError {
    match err {
        CancelError::DeadlineExceeded => CliError::new(TIMEOUT, format!("{context}: {err}")),
        CancelError::Rpc(err) => rpc_error(context, err),
        CancelError::Cancelled(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        CancelError::ConcurrentUse { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Frame(err) => frame_error(context, err),
        ServerError::Cancel(err) => cancel_error(context, err),
        ServerError::Rpc(err) => rpc_error(context, err),
        ServerError::Signal(source) => io_error(context, source),
        ServerError::DeadlineHeader(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ServerError::Listener(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_maps_to_timeout() {
        let err = server_error("call failed", CancelError::DeadlineExceeded.into());
        assert_eq!(err.code, TIMEOUT);
        assert_eq!(err.message, "call failed: deadline exceeded");
    }

    #[test]
    fn closing_server_maps_to_transport_error() {
        let cancel: CancelError = RpcError::new(Status::Unavailable, "server is closing").into();
        assert_eq!(server_error("call failed", cancel.into()).code, TRANSPORT_ERROR);
    }

    #[test]
    fn refused_connection_is_a_plain_failure() {
        let err = TransportError::Connect {
            endpoint: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(transport_error("connect failed", err).code, FAILURE);
    }

    #[test]
    fn bad_endpoint_is_a_usage_error() {
        let err = TransportError::InvalidEndpoint("nope".to_string());
        assert_eq!(transport_error("invalid endpoint", err).code, USAGE);
    }
}
