use std::marker::PhantomData;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, Dispatch};
use wirecall_transport::Endpoint;

use crate::config::{build_runtime, ClientConfig};
use crate::connection::Connection;
use crate::connector::ConnectionManager;
use crate::error::{Result, RpcError};
use crate::message::Method;
use crate::serializer::{JsonSerializer, Serializer};
use crate::state::{ClientState, StateCell};

/// Blocking RPC client over one persistent TCP connection.
///
/// `connect`, `call` and `disconnect` block the calling thread; all socket
/// work happens on a runtime the client creates per connection. Do not call
/// them from inside an async runtime.
///
/// Calls may be issued from several threads at once. They are written in the
/// order they are issued and answered in that same order.
pub struct Client<M: Method, S: Serializer = JsonSerializer> {
    config: ClientConfig,
    serializer: S,
    cell: StateCell<ClientState, Connection<M::Response>>,
    _method: PhantomData<fn(M)>,
}

impl<M: Method> Client<M, JsonSerializer> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_serializer(config, JsonSerializer)
    }
}

impl<M: Method, S: Serializer> Client<M, S> {
    pub fn with_serializer(config: ClientConfig, serializer: S) -> Self {
        Self {
            config,
            serializer,
            cell: StateCell::new(ClientState::Initialized),
            _method: PhantomData,
        }
    }

    pub fn state(&self) -> ClientState {
        self.cell.current()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Address of the connected server, while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.cell
            .with_live("query peer", ClientState::Connected, Connection::peer_addr)
            .ok()
    }

    /// Connect to `host:port`, retrying per the configured policy.
    ///
    /// Only legal when `Initialized` or `Disconnected`; otherwise fails with
    /// [`RpcError::InvalidState`] without touching the network.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        tracing::dispatcher::with_default(&self.config.logger, || {
            self.cell.transition(
                "connect",
                &[ClientState::Initialized, ClientState::Disconnected],
                ClientState::Connecting,
            )?;

            let endpoint = Endpoint::new(host, port);
            match self.open(&endpoint) {
                Ok(connection) => {
                    info!(%endpoint, peer = %connection.peer_addr(), "client connected");
                    self.cell.settle(ClientState::Connected, Some(connection));
                    Ok(())
                }
                Err(err) => {
                    self.cell.settle(ClientState::Disconnected, None);
                    Err(err)
                }
            }
        })
    }

    fn open(&self, endpoint: &Endpoint) -> Result<Connection<M::Response>> {
        let runtime =
            build_runtime(self.config.threads, "wirecall-client").map_err(RpcError::Runtime)?;

        let manager = ConnectionManager::new(self.config.retry.clone());
        let target = endpoint.clone();
        let connecting = runtime.spawn(
            async move { manager.connect(&target).await }
                .with_subscriber(self.config.logger.clone()),
        );
        let stream = runtime
            .block_on(connecting)
            .map_err(|err| RpcError::Runtime(std::io::Error::other(err)))??;

        Connection::spawn(
            runtime,
            stream,
            self.serializer.clone(),
            self.config.frame_config(),
            &self.config.logger,
        )
    }

    /// Call `method` with the configured default timeout.
    pub fn call(&self, method: M) -> Result<M::Response> {
        self.call_with_timeout(method, self.config.call_timeout)
    }

    /// Call `method`, failing with [`RpcError::Timeout`] if no response
    /// arrives within `timeout`. A timeout leaves the connection usable.
    pub fn call_with_timeout(&self, method: M, timeout: Duration) -> Result<M::Response> {
        let handle = self
            .cell
            .with_live("call", ClientState::Connected, Connection::handle)?;
        let payload = self.serializer.encode(&method)?;

        tracing::dispatcher::with_default(&self.config.logger, || {
            let result = handle.call(payload, timeout);
            if let Err(err) = &result {
                debug!(error = %err, "call failed");
            }
            result
        })
    }

    /// Close the connection. A no-op unless `Connected`.
    pub fn disconnect(&self) {
        tracing::dispatcher::with_default(&self.config.logger, || {
            let Some(connection) = self
                .cell
                .take_live(ClientState::Connected, ClientState::Disconnecting)
            else {
                return;
            };

            let peer = connection.peer_addr();
            connection.close(self.config.shutdown_grace);
            self.cell.settle(ClientState::Disconnected, None);
            info!(%peer, "client disconnected");
        });
    }
}

impl<M: Method, S: Serializer> Drop for Client<M, S> {
    fn drop(&mut self) {
        let logger: Dispatch = self.config.logger.clone();
        let grace = self.config.shutdown_grace;
        let slot = self.cell.get_mut();

        let Some(connection) = slot.resource.take() else {
            return;
        };
        slot.state = ClientState::Disconnected;

        tracing::dispatcher::with_default(&logger, || {
            error!(peer = %connection.peer_addr(), "client dropped while connected, closing connection");
        });
        connection.close(grace);

        debug_assert!(
            std::thread::panicking(),
            "wirecall Client dropped while connected; call disconnect() first"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    enum Noop {
        Ping,
    }

    impl Method for Noop {
        type Response = ();
    }

    #[test]
    fn starts_initialized() {
        let client: Client<Noop> = Client::new(ClientConfig::default());
        assert_eq!(client.state(), ClientState::Initialized);
        assert!(client.peer_addr().is_none());
    }

    #[test]
    fn call_before_connect_is_invalid_state() {
        let client: Client<Noop> = Client::new(ClientConfig::default());
        let err = client.call(Noop::Ping).unwrap_err();
        assert!(matches!(
            err,
            RpcError::InvalidState {
                operation: "call",
                state: "initialized"
            }
        ));
    }

    #[test]
    fn disconnect_is_noop_when_not_connected() {
        let client: Client<Noop> = Client::new(ClientConfig::default());
        client.disconnect();
        assert_eq!(client.state(), ClientState::Initialized);
    }

    #[test]
    fn failed_connect_lands_in_disconnected() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let client: Client<Noop> = Client::new(
            ClientConfig::default()
                .with_max_connection_attempts(2)
                .with_connection_retry_base(Duration::from_millis(1)),
        );

        let err = client.connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, RpcError::Connect { attempts: 2, .. }));
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}
