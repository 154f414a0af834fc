use std::time::Duration;

use crate::serializer::SerializationError;

/// Errors that can occur in client and server operations.
///
/// Every variant is scoped to one call or one connection; nothing here is
/// fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wirecall_transport::TransportError),

    /// The byte stream could not be segmented into frames.
    #[error("frame error: {0}")]
    Frame(#[from] wirecall_frame::FrameError),

    /// A value could not be encoded, or a payload did not decode.
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Every connection attempt failed.
    #[error("failed to connect to {endpoint} after {attempts} attempt(s): {source}")]
    Connect {
        endpoint: String,
        attempts: u32,
        source: wirecall_transport::TransportError,
    },

    /// No response arrived within the call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection while calls were outstanding.
    #[error("connection reset by peer")]
    ConnectionResetByPeer,

    /// The connection is no longer running.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation is not legal in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The remote performer failed to execute the method.
    #[error("application error: {0}")]
    Application(String),

    /// The async runtime could not be created.
    #[error("runtime error: {0}")]
    Runtime(std::io::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;
