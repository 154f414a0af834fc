use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, info_span, warn, Dispatch, Instrument};
use wirecall_frame::{FrameConfig, NulCodec};
use wirecall_transport::{Endpoint, TransportError};

use crate::config::{build_runtime, ServerConfig};
use crate::dispatch::{serve_connection, Performer};
use crate::error::{Result, RpcError};
use crate::message::Method;
use crate::serializer::{JsonSerializer, Serializer};
use crate::state::{ServerState, StateCell};

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// RPC server: accepts TCP connections and answers each request with the
/// outcome of its [`Performer`].
///
/// Every accepted connection gets its own codec and write sequencer; nothing
/// mutable is shared between clients except the performer itself.
pub struct Server<M, P, S = JsonSerializer>
where
    M: Method,
    P: Performer<M>,
    S: Serializer,
{
    config: ServerConfig,
    performer: Arc<P>,
    serializer: S,
    cell: StateCell<ServerState, Running>,
    _method: PhantomData<fn(M)>,
}

/// Everything that exists only while the server is `Started`.
struct Running {
    runtime: Runtime,
    shutdown: CancellationToken,
    connections: TaskTracker,
    accept_loop: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl<M, P> Server<M, P, JsonSerializer>
where
    M: Method,
    P: Performer<M>,
{
    pub fn new(config: ServerConfig, performer: P) -> Self {
        Self::with_serializer(config, performer, JsonSerializer)
    }
}

impl<M, P, S> Server<M, P, S>
where
    M: Method,
    P: Performer<M>,
    S: Serializer,
{
    pub fn with_serializer(config: ServerConfig, performer: P, serializer: S) -> Self {
        Self {
            config,
            performer: Arc::new(performer),
            serializer,
            cell: StateCell::new(ServerState::Initialized),
            _method: PhantomData,
        }
    }

    pub fn state(&self) -> ServerState {
        self.cell.current()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address the listener is bound to, while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.cell
            .with_live("query address", ServerState::Started, |running| {
                running.local_addr
            })
            .ok()
    }

    /// Bind `host:port` and start serving. Port 0 picks a free port; the
    /// bound address is returned.
    ///
    /// Only legal when `Initialized` or `Stopped`.
    pub fn start(&self, host: &str, port: u16) -> Result<SocketAddr> {
        tracing::dispatcher::with_default(&self.config.logger, || {
            self.cell.transition(
                "start",
                &[ServerState::Initialized, ServerState::Stopped],
                ServerState::Starting,
            )?;

            match self.launch(&Endpoint::new(host, port)) {
                Ok(running) => {
                    let addr = running.local_addr;
                    info!(%addr, threads = self.config.threads, "server started");
                    self.cell.settle(ServerState::Started, Some(running));
                    Ok(addr)
                }
                Err(err) => {
                    self.cell.settle(ServerState::Stopped, None);
                    Err(err)
                }
            }
        })
    }

    fn launch(&self, endpoint: &Endpoint) -> Result<Running> {
        let runtime =
            build_runtime(self.config.threads, "wirecall-server").map_err(RpcError::Runtime)?;

        let listener = runtime.block_on(wirecall_transport::bind(endpoint))?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();
        let acceptor = Acceptor {
            listener,
            performer: Arc::clone(&self.performer),
            serializer: self.serializer.clone(),
            frame_config: self.config.frame_config(),
            shutdown: shutdown.clone(),
            connections: connections.clone(),
            logger: self.config.logger.clone(),
        };
        let accept_loop = runtime.spawn(
            acceptor
                .run::<M>()
                .instrument(info_span!("server", addr = %local_addr))
                .with_subscriber(self.config.logger.clone()),
        );

        Ok(Running {
            runtime,
            shutdown,
            connections,
            accept_loop,
            local_addr,
        })
    }

    /// Close the listener and every accepted connection, then release the
    /// runtime. A no-op unless `Started`.
    pub fn stop(&self) {
        tracing::dispatcher::with_default(&self.config.logger, || {
            let Some(running) = self
                .cell
                .take_live(ServerState::Started, ServerState::Stopping)
            else {
                return;
            };

            let addr = running.local_addr;
            running.shut_down(self.config.shutdown_grace);
            self.cell.settle(ServerState::Stopped, None);
            info!(%addr, "server stopped");
        });
    }
}

impl<M, P, S> Drop for Server<M, P, S>
where
    M: Method,
    P: Performer<M>,
    S: Serializer,
{
    fn drop(&mut self) {
        let logger: Dispatch = self.config.logger.clone();
        let grace = self.config.shutdown_grace;
        let slot = self.cell.get_mut();

        let Some(running) = slot.resource.take() else {
            return;
        };
        slot.state = ServerState::Stopped;

        tracing::dispatcher::with_default(&logger, || {
            warn!(addr = %running.local_addr, "server dropped while started, stopping");
            running.shut_down(grace);
        });
    }
}

impl Running {
    fn shut_down(self, grace: Duration) {
        let Running {
            runtime,
            shutdown,
            connections,
            accept_loop,
            local_addr,
        } = self;

        shutdown.cancel();
        connections.close();

        let drained = runtime.block_on(async {
            if let Err(err) = accept_loop.await {
                warn!(addr = %local_addr, error = %err, "accept loop failed");
            }
            tokio::time::timeout(grace, connections.wait()).await
        });
        if drained.is_err() {
            warn!(
                addr = %local_addr,
                open = connections.len(),
                ?grace,
                "connections did not close in time"
            );
        }

        runtime.shutdown_timeout(grace);
    }
}

/// The listening side of a started server.
struct Acceptor<P, S> {
    listener: TcpListener,
    performer: Arc<P>,
    serializer: S,
    frame_config: FrameConfig,
    shutdown: CancellationToken,
    connections: TaskTracker,
    logger: Dispatch,
}

impl<P, S: Serializer> Acceptor<P, S> {
    async fn run<M>(self)
    where
        M: Method,
        P: Performer<M>,
    {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = wirecall_transport::accept(&self.listener) => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    self.connections.spawn(
                        serve_connection::<M, _, _, _>(
                            stream,
                            peer,
                            NulCodec::with_config(self.frame_config.clone()),
                            Arc::clone(&self.performer),
                            self.serializer.clone(),
                            self.shutdown.clone(),
                            self.logger.clone(),
                        )
                        .instrument(info_span!("connection", %peer))
                        .with_subscriber(self.logger.clone()),
                    );
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
        debug!("listener closed");
    }
}
