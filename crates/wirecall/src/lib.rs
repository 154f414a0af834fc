//! Typed request/response RPC over a single TCP connection.
//!
//! Messages travel as NUL-delimited frames; responses come back in request
//! order and are matched to calls by position.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoints, connect, bind and accept
//! - [`frame`]: NUL-delimited framing with an incremental scan cursor
//! - [`rpc`]: client, server, serializers and lifecycle (behind `rpc` feature)

/// Re-export transport types.
pub mod transport {
    pub use wirecall_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wirecall_frame::*;
}

/// Re-export RPC types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use wirecall_rpc::*;
}
