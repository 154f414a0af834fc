//! Client-side request/response correlation.
//!
//! Responses carry no request id. The Nth frame read from a connection
//! answers the Nth call written to it, so pending calls sit in a FIFO queue
//! owned by the single task that drives the connection. Nothing else touches
//! the queue, so it needs no lock.

use std::collections::VecDeque;
use std::marker::PhantomData;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wirecall_frame::NulCodec;

use crate::error::{Result, RpcError};
use crate::message::Response;
use crate::serializer::Serializer;

/// An encoded call waiting to be written, plus where its outcome goes.
///
/// The receiving half may be dropped at any time (the caller timed out);
/// resolving it then is a no-op.
pub(crate) struct PendingCall<R> {
    pub payload: Bytes,
    pub reply: oneshot::Sender<Result<R>>,
}

pub(crate) struct Correlator<T, R, S> {
    framed: Framed<T, NulCodec>,
    queue: VecDeque<oneshot::Sender<Result<R>>>,
    serializer: S,
    _response: PhantomData<fn() -> R>,
}

impl<T, R, S> Correlator<T, R, S>
where
    T: AsyncRead + AsyncWrite + Unpin,
    R: DeserializeOwned,
    S: Serializer,
{
    pub fn new(io: T, codec: NulCodec, serializer: S) -> Self {
        Self {
            framed: Framed::new(io, codec),
            queue: VecDeque::new(),
            serializer,
            _response: PhantomData,
        }
    }

    /// Drive the connection until it closes, fails, or `shutdown` fires.
    ///
    /// Every call still queued when this returns has been resolved.
    pub async fn run(
        mut self,
        mut calls: mpsc::UnboundedReceiver<PendingCall<R>>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!(pending = self.queue.len(), "closing connection");
                    self.fail_remaining(|| RpcError::ConnectionClosed);
                    if let Err(err) = self.framed.close().await {
                        debug!(error = %err, "error closing connection");
                    }
                    return;
                }

                call = calls.recv() => {
                    let Some(call) = call else {
                        self.fail_remaining(|| RpcError::ConnectionClosed);
                        return;
                    };
                    if let Err(err) = self.framed.codec().check_payload(&call.payload) {
                        debug!(error = %err, "rejecting unframeable call");
                        let _ = call.reply.send(Err(err.into()));
                        continue;
                    }
                    self.queue.push_back(call.reply);
                    if let Err(err) = self.framed.send(call.payload).await {
                        warn!(error = %err, "write failed, closing connection");
                        if let Some(reply) = self.queue.pop_back() {
                            let _ = reply.send(Err(err.into()));
                        }
                        self.fail_remaining(|| RpcError::ConnectionClosed);
                        return;
                    }
                }

                frame = self.framed.next() => match frame {
                    Some(Ok(payload)) => self.resolve_head(payload),
                    Some(Err(err)) => {
                        warn!(error = %err, "read failed, closing connection");
                        self.fail_head(err.into());
                        self.fail_remaining(|| RpcError::ConnectionClosed);
                        return;
                    }
                    None => {
                        if self.queue.is_empty() {
                            debug!("peer closed connection");
                        } else {
                            warn!(pending = self.queue.len(), "peer closed connection with calls outstanding");
                        }
                        self.fail_remaining(|| RpcError::ConnectionResetByPeer);
                        return;
                    }
                },
            }
        }
    }

    fn resolve_head(&mut self, payload: Bytes) {
        let Some(reply) = self.queue.pop_front() else {
            debug!(bytes = payload.len(), "dropping frame with no pending call");
            return;
        };

        let outcome = self
            .serializer
            .decode::<Response<R>>(&payload)
            .map_err(RpcError::from)
            .and_then(Response::into_result);

        if reply.send(outcome).is_err() {
            debug!("discarding response for abandoned call");
        }
    }

    fn fail_head(&mut self, err: RpcError) {
        if let Some(reply) = self.queue.pop_front() {
            let _ = reply.send(Err(err));
        }
    }

    fn fail_remaining(&mut self, err: impl Fn() -> RpcError) {
        for reply in self.queue.drain(..) {
            let _ = reply.send(Err(err()));
        }
    }
}
