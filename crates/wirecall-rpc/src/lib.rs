//! Typed request/response RPC over a single TCP connection.
//!
//! A [`Client`] sends [`Method`] values to a [`Server`], which hands each one
//! to a [`Performer`] and writes back the outcome. Messages travel as
//! NUL-terminated frames encoded by a pluggable [`Serializer`] (JSON by
//! default). Responses carry no request id: the server writes them in
//! request order and the client matches them to calls by position.
//!
//! Both [`Client`] and [`Server`] present a blocking API and own the tokio
//! runtime their sockets live on. Calling them from inside an async runtime
//! panics.
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use wirecall_rpc::{performer_fn, BoxError, Client, ClientConfig, Method, Server, ServerConfig};
//!
//! #[derive(Serialize, Deserialize)]
//! enum Echo {
//!     Say(String),
//! }
//!
//! impl Method for Echo {
//!     type Response = String;
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server: Server<Echo, _> = Server::new(
//!     ServerConfig::default(),
//!     performer_fn(|Echo::Say(text): Echo| async move { Ok::<_, BoxError>(text) }),
//! );
//! let addr = server.start("127.0.0.1", 0)?;
//!
//! let client: Client<Echo> = Client::new(ClientConfig::default());
//! client.connect("127.0.0.1", addr.port())?;
//! assert_eq!(client.call(Echo::Say("hi".into()))?, "hi");
//! client.disconnect();
//! server.stop();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod serializer;
pub mod server;
pub mod state;

mod connection;
mod correlator;

pub use client::Client;
pub use config::{ClientConfig, RetryPolicy, ServerConfig};
pub use connector::ConnectionManager;
pub use dispatch::{performer_fn, FnPerformer, Performer};
pub use error::{Result, RpcError};
pub use message::{Method, Response};
pub use serializer::{BoxError, JsonSerializer, SerializationError, Serializer};
pub use server::Server;
pub use state::{ClientState, ServerState};
pub use wirecall_transport::Endpoint;
