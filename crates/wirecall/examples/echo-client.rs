//! Calls the `echo-server` example.
//!
//! Run with:
//!   cargo run --example echo-client -- hello world

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wirecall::rpc::{Client, ClientConfig, Method, RpcError};

#[derive(Debug, Serialize, Deserialize)]
enum Echo {
    Say(String),
    Shout(String),
}

impl Method for Echo {
    type Response = String;
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");

    let client: Client<Echo> = Client::new(
        ClientConfig::default()
            .with_max_connection_attempts(5)
            .with_call_timeout(Duration::from_secs(2)),
    );
    client.connect("127.0.0.1", 7400)?;

    let said = client.call(Echo::Say(text.clone()));
    let shouted = client.call(Echo::Shout(text));
    client.disconnect();

    println!("say:   {}", said?);
    match shouted {
        Ok(reply) => println!("shout: {reply}"),
        Err(RpcError::Application(message)) => println!("shout failed: {message}"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
