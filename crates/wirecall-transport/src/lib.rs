//! TCP transport for wirecall.
//!
//! This is the lowest layer of wirecall. It resolves host/port pairs and
//! produces connected [`tokio::net::TcpStream`]s with the socket options the
//! wire protocol expects:
//! - `SO_REUSEADDR` on both the connecting and the listening socket
//! - `TCP_NODELAY` on connections accepted by a server
//!
//! Retry policy lives one layer up; every function here makes exactly one
//! attempt.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{accept, bind, connect, resolve, Endpoint};
