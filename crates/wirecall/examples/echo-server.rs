//! Minimal echo server: answers `Echo` calls until the process is killed.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --example echo-client -- hello

use serde::{Deserialize, Serialize};
use wirecall::rpc::{performer_fn, BoxError, Method, Server, ServerConfig};

#[derive(Debug, Serialize, Deserialize)]
enum Echo {
    Say(String),
    Shout(String),
}

impl Method for Echo {
    type Response = String;
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let performer = performer_fn(|method: Echo| async move {
        match method {
            Echo::Say(text) => Ok(text),
            Echo::Shout(text) if text.is_empty() => Err(BoxError::from("nothing to shout")),
            Echo::Shout(text) => Ok(text.to_uppercase()),
        }
    });

    let server: Server<Echo, _> = Server::new(ServerConfig::default(), performer);
    let addr = server.start("127.0.0.1", 7400)?;
    eprintln!("Listening on {addr}");

    loop {
        std::thread::park();
    }
}
