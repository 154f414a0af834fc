use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use wirecall_rpc::{
    BoxError, Client, ClientConfig, ClientState, Method, Performer, RpcError, SerializationError,
    Server, ServerConfig, ServerState,
};
use wirecall_frame::FrameError;

#[derive(Debug, Serialize, Deserialize)]
enum Calc {
    Add(i64, i64),
    Sleep { millis: u64, reply: i64 },
    Fail(String),
    /// Tuple keys have no JSON form, so a non-empty map never encodes.
    Tally(BTreeMap<(i64, i64), i64>),
}

impl Method for Calc {
    type Response = i64;
}

struct Calculator;

impl Performer<Calc> for Calculator {
    async fn perform(&self, method: Calc) -> Result<i64, BoxError> {
        match method {
            Calc::Add(a, b) => Ok(a + b),
            Calc::Sleep { millis, reply } => {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(reply)
            }
            Calc::Fail(message) => Err(message.into()),
            Calc::Tally(counts) => Ok(counts.values().sum()),
        }
    }
}

fn start_server() -> (Server<Calc, Calculator>, SocketAddr) {
    let server = Server::new(
        ServerConfig::default()
            .with_threads(2)
            .with_shutdown_grace(Duration::from_secs(1)),
        Calculator,
    );
    let addr = server.start("127.0.0.1", 0).unwrap();
    (server, addr)
}

fn client_config() -> ClientConfig {
    ClientConfig::default()
        .with_max_connection_attempts(3)
        .with_connection_retry_base(Duration::from_millis(10))
        .with_call_timeout(Duration::from_secs(5))
        .with_shutdown_grace(Duration::from_secs(1))
}

fn connected_client(addr: SocketAddr) -> Client<Calc> {
    let client = Client::new(client_config());
    client.connect("127.0.0.1", addr.port()).unwrap();
    client
}

fn unused_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

#[test]
fn sequential_calls_return_matching_results() {
    let (server, addr) = start_server();
    let client = connected_client(addr);
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(client.peer_addr(), Some(addr));

    for i in 0..10 {
        assert_eq!(client.call(Calc::Add(i, 100)).unwrap(), i + 100);
    }

    client.disconnect();
    assert_eq!(client.state(), ClientState::Disconnected);
    server.stop();
}

#[test]
fn call_before_connect_fails_without_io() {
    let client: Client<Calc> = Client::new(client_config());
    let err = client.call(Calc::Add(1, 2)).unwrap_err();
    assert!(matches!(err, RpcError::InvalidState { operation: "call", .. }));
    assert_eq!(client.state(), ClientState::Initialized);
}

#[test]
fn connect_twice_is_invalid_state() {
    let (server, addr) = start_server();
    let client = connected_client(addr);

    let err = client.connect("127.0.0.1", addr.port()).unwrap_err();
    assert!(matches!(
        err,
        RpcError::InvalidState {
            operation: "connect",
            state: "connected"
        }
    ));
    assert_eq!(client.call(Calc::Add(2, 2)).unwrap(), 4);

    client.disconnect();
    server.stop();
}

#[test]
fn reconnect_after_disconnect() {
    let (server, addr) = start_server();
    let client = connected_client(addr);
    client.disconnect();

    let err = client.call(Calc::Add(1, 1)).unwrap_err();
    assert!(matches!(
        err,
        RpcError::InvalidState {
            state: "disconnected",
            ..
        }
    ));

    client.connect("127.0.0.1", addr.port()).unwrap();
    assert_eq!(client.call(Calc::Add(1, 1)).unwrap(), 2);
    client.disconnect();
    server.stop();
}

#[test]
fn timeout_leaves_connection_usable() {
    let (server, addr) = start_server();
    let client = connected_client(addr);

    let started = Instant::now();
    let err = client
        .call_with_timeout(
            Calc::Sleep {
                millis: 500,
                reply: 1,
            },
            Duration::from_millis(100),
        )
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(t) if t == Duration::from_millis(100)));
    assert!(started.elapsed() < Duration::from_millis(450));

    // The late response to the timed-out call is consumed, not delivered here.
    assert_eq!(client.call(Calc::Add(20, 22)).unwrap(), 42);

    client.disconnect();
    server.stop();
}

#[test]
fn unencodable_call_fails_alone_and_connection_stays_usable() {
    let (server, addr) = start_server();
    let client = connected_client(addr);

    let err = client
        .call(Calc::Tally(BTreeMap::from([((1, 2), 3)])))
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Serialization(SerializationError::Encode { .. })
    ));
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(client.call(Calc::Add(1, 2)).unwrap(), 3);

    client.disconnect();
    server.stop();
}

#[test]
fn oversized_call_fails_alone_and_connection_stays_usable() {
    let (server, addr) = start_server();
    let client: Client<Calc> = Client::new(client_config().with_max_payload_size(64));
    client.connect("127.0.0.1", addr.port()).unwrap();

    let err = client.call(Calc::Fail("x".repeat(100))).unwrap_err();
    assert!(matches!(
        err,
        RpcError::Frame(FrameError::PayloadTooLarge { max: 64, .. })
    ));
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(client.call(Calc::Add(5, 6)).unwrap(), 11);

    client.disconnect();
    server.stop();
}

#[test]
fn performer_failure_reaches_caller() {
    let (server, addr) = start_server();
    let client = connected_client(addr);

    let err = client.call(Calc::Fail("X".to_string())).unwrap_err();
    assert!(matches!(err, RpcError::Application(ref m) if m == "X"));
    assert_eq!(err.to_string(), "application error: X");

    // One failed call does not affect the next.
    assert_eq!(client.call(Calc::Add(3, 4)).unwrap(), 7);

    client.disconnect();
    server.stop();
}

#[test]
fn connect_gives_up_after_max_attempts() {
    let client: Client<Calc> = Client::new(client_config());

    let started = Instant::now();
    let err = client.connect("127.0.0.1", unused_port()).unwrap_err();
    assert!(matches!(err, RpcError::Connect { attempts: 3, .. }));
    // 10ms after attempt 1, 20ms after attempt 2.
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[test]
fn concurrent_calls_resolve_to_their_own_responses() {
    let (server, addr) = start_server();
    let client = Arc::new(connected_client(addr));

    // The slow call is written first, so its response is written first too
    // even though the fast one finishes earlier on the server.
    let slow = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            client.call(Calc::Sleep {
                millis: 300,
                reply: 1,
            })
        })
    };
    thread::sleep(Duration::from_millis(50));
    let fast = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.call(Calc::Sleep { millis: 0, reply: 2 }))
    };

    assert_eq!(fast.join().unwrap().unwrap(), 2);
    assert_eq!(slow.join().unwrap().unwrap(), 1);

    client.disconnect();
    server.stop();
}

#[test]
fn many_threads_share_one_client() {
    let (server, addr) = start_server();
    let client = Arc::new(connected_client(addr));

    let workers: Vec<_> = (0..8)
        .map(|n| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for i in 0..25 {
                    assert_eq!(client.call(Calc::Add(n * 1000, i)).unwrap(), n * 1000 + i);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    client.disconnect();
    server.stop();
}

#[test]
fn server_lifecycle_guards() {
    let (server, addr) = start_server();
    assert_eq!(server.state(), ServerState::Started);

    let err = server.start("127.0.0.1", 0).unwrap_err();
    assert!(matches!(
        err,
        RpcError::InvalidState {
            operation: "start",
            state: "started"
        }
    ));

    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);

    // A stopped server no longer accepts.
    let client: Client<Calc> = Client::new(client_config());
    assert!(client.connect("127.0.0.1", addr.port()).is_err());

    let addr = server.start("127.0.0.1", 0).unwrap();
    let client = connected_client(addr);
    assert_eq!(client.call(Calc::Add(5, 5)).unwrap(), 10);
    client.disconnect();
    server.stop();
}

#[test]
fn clients_are_served_independently() {
    let (server, addr) = start_server();
    let first = connected_client(addr);
    let second = connected_client(addr);

    assert_eq!(first.call(Calc::Add(1, 0)).unwrap(), 1);
    assert_eq!(second.call(Calc::Add(2, 0)).unwrap(), 2);
    first.disconnect();
    assert_eq!(second.call(Calc::Add(3, 0)).unwrap(), 3);

    second.disconnect();
    server.stop();
}

#[test]
fn undecodable_request_closes_connection() {
    let (server, addr) = start_server();

    let mut raw = TcpStream::connect(addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(b"{\"Add\":[1,2]}\0this is not a method\0").unwrap();

    let mut received = Vec::new();
    raw.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"{\"success\":3}\0");

    // Other clients are unaffected.
    let client = connected_client(addr);
    assert_eq!(client.call(Calc::Add(1, 1)).unwrap(), 2);
    client.disconnect();
    server.stop();
}

#[test]
fn server_stop_resets_outstanding_call() {
    let (server, addr) = start_server();
    let client = Arc::new(connected_client(addr));

    let pending = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            client.call(Calc::Sleep {
                millis: 5_000,
                reply: 0,
            })
        })
    };
    thread::sleep(Duration::from_millis(100));
    server.stop();

    let err = pending.join().unwrap().unwrap_err();
    assert!(matches!(err, RpcError::ConnectionResetByPeer));

    // The connection is unusable after the reset.
    let err = client.call(Calc::Add(1, 1)).unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));
    client.disconnect();
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[test]
fn disconnect_fails_outstanding_call() {
    let (server, addr) = start_server();
    let client = Arc::new(connected_client(addr));

    let pending = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            client.call(Calc::Sleep {
                millis: 5_000,
                reply: 0,
            })
        })
    };
    thread::sleep(Duration::from_millis(100));
    client.disconnect();

    let err = pending.join().unwrap().unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));
    server.stop();
}
