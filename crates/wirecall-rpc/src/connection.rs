use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info_span, warn, Dispatch, Instrument};
use wirecall_frame::{FrameConfig, NulCodec};

use crate::correlator::{Correlator, PendingCall};
use crate::error::{Result, RpcError};
use crate::serializer::Serializer;

/// One live client connection.
///
/// Owns the runtime its socket is registered with, the task that drives the
/// socket, and the sending side of that task's call queue. Never reused once
/// closed.
pub(crate) struct Connection<R> {
    runtime: Runtime,
    calls: mpsc::UnboundedSender<PendingCall<R>>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    peer: SocketAddr,
}

/// What a caller needs to issue a call without holding the state lock.
pub(crate) struct CallHandle<R> {
    runtime: Handle,
    calls: mpsc::UnboundedSender<PendingCall<R>>,
}

impl<R> Connection<R>
where
    R: DeserializeOwned + Send + 'static,
{
    /// Start driving `stream` on `runtime`.
    pub fn spawn<S: Serializer>(
        runtime: Runtime,
        stream: TcpStream,
        serializer: S,
        frame_config: FrameConfig,
        logger: &Dispatch,
    ) -> Result<Self> {
        let peer = stream.peer_addr().map_err(wirecall_transport::TransportError::Io)?;
        let (calls, queue) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let correlator: Correlator<_, R, _> =
            Correlator::new(stream, NulCodec::with_config(frame_config), serializer);
        let task = runtime.spawn(
            correlator
                .run(queue, shutdown.clone())
                .instrument(info_span!("connection", %peer))
                .with_subscriber(logger.clone()),
        );

        Ok(Self {
            runtime,
            calls,
            shutdown,
            task,
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn handle(&self) -> CallHandle<R> {
        CallHandle {
            runtime: self.runtime.handle().clone(),
            calls: self.calls.clone(),
        }
    }

    /// Close the socket and release the runtime.
    ///
    /// Outstanding calls fail with [`RpcError::ConnectionClosed`]. Teardown
    /// problems are logged; there is nothing a caller could do about them.
    pub fn close(self, grace: Duration) {
        self.shutdown.cancel();
        let task = self.task;
        match self
            .runtime
            .block_on(async { tokio::time::timeout(grace, task).await })
        {
            Ok(Ok(())) => debug!(peer = %self.peer, "connection closed"),
            Ok(Err(err)) => warn!(peer = %self.peer, error = %err, "connection task failed"),
            Err(_) => warn!(peer = %self.peer, ?grace, "connection did not drain in time"),
        }
        self.runtime.shutdown_timeout(grace);
    }
}

impl<R> CallHandle<R> {
    /// Queue `payload` and block the calling thread until its response
    /// arrives or `timeout` elapses.
    ///
    /// A timed-out call stays queued so its late response is still matched
    /// (and then discarded) in order.
    pub fn call(&self, payload: Bytes, timeout: Duration) -> Result<R> {
        let (reply, outcome) = oneshot::channel();
        self.calls
            .send(PendingCall { payload, reply })
            .map_err(|_| RpcError::ConnectionClosed)?;

        self.runtime.block_on(async move {
            match tokio::time::timeout(timeout, outcome).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RpcError::ConnectionClosed),
                Err(_) => Err(RpcError::Timeout(timeout)),
            }
        })
    }
}
