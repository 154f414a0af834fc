use std::fmt;
use std::io;

use wirecall_frame::FrameError;
use wirecall_rpc::RpcError;
use wirecall_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

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

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    }
}

fn transport_code(err: &TransportError) -> i32 {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_code(source),
        TransportError::Resolve { .. } | TransportError::NoAddress(_) => TRANSPORT_ERROR,
    }
}

fn frame_code(err: &FrameError) -> i32 {
    match err {
        FrameError::Io(source) => io_code(source),
        FrameError::PayloadTooLarge { .. } | FrameError::DelimiterInPayload { .. } => DATA_INVALID,
    }
}

fn rpc_code(err: &RpcError) -> i32 {
    match err {
        RpcError::Transport(err) => transport_code(err),
        RpcError::Connect { .. } => TRANSPORT_ERROR,
        RpcError::Frame(err) => frame_code(err),
        RpcError::Serialization(_) => DATA_INVALID,
        RpcError::Timeout(_) => TIMEOUT,
        RpcError::ConnectionResetByPeer
        | RpcError::ConnectionClosed
        | RpcError::Application(_) => FAILURE,
        RpcError::InvalidState { .. } | RpcError::Runtime(_) => INTERNAL,
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    CliError::new(rpc_code(&err), format!("{context}: {err}"))
}
