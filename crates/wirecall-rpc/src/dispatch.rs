//! Server-side invocation dispatch.
//!
//! Each request read from a connection runs as its own task, so a slow
//! method never stalls the read loop. Responses still leave in request
//! order: the read loop hands each task's join handle to a per-connection
//! writer, which awaits them strictly in the order the requests arrived.
//! Clients match responses to calls by position alone.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, warn, Dispatch, Instrument};
use wirecall_frame::NulCodec;

use crate::message::{Method, Response};
use crate::serializer::{BoxError, Serializer};

/// Executes decoded methods on the server.
///
/// Called concurrently from many tasks; a failure's message (its `Display`
/// output) is what the client sees.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use wirecall_rpc::{BoxError, Method, Performer};
///
/// #[derive(Serialize, Deserialize)]
/// enum Greeter {
///     Hello(String),
/// }
///
/// impl Method for Greeter {
///     type Response = String;
/// }
///
/// struct Polite;
///
/// impl Performer<Greeter> for Polite {
///     async fn perform(&self, method: Greeter) -> Result<String, BoxError> {
///         match method {
///             Greeter::Hello(name) => Ok(format!("hello, {name}")),
///         }
///     }
/// }
/// ```
pub trait Performer<M: Method>: Send + Sync + 'static {
    fn perform(&self, method: M)
        -> impl Future<Output = Result<M::Response, BoxError>> + Send;
}

/// A [`Performer`] backed by a closure returning a future.
#[derive(Clone)]
pub struct FnPerformer<F> {
    f: F,
}

/// Wrap `f` as a [`Performer`].
pub fn performer_fn<F>(f: F) -> FnPerformer<F> {
    FnPerformer { f }
}

impl<M, F, Fut> Performer<M> for FnPerformer<F>
where
    M: Method,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<M::Response, BoxError>> + Send + 'static,
{
    fn perform(&self, method: M) -> impl Future<Output = Result<M::Response, BoxError>> + Send {
        (self.f)(method)
    }
}

type Invocation<R> = JoinHandle<Result<R, BoxError>>;

/// Invocations one connection may have queued behind the writer before the
/// read loop stops taking new requests.
const MAX_IN_FLIGHT: usize = 64;

/// Serve one accepted connection until the peer leaves, it misbehaves, or
/// `shutdown` fires.
///
/// A request that fails to decode is logged and ends the connection; the
/// responses to requests already accepted are still written first.
pub(crate) async fn serve_connection<M, P, S, T>(
    io: T,
    peer: SocketAddr,
    codec: NulCodec,
    performer: Arc<P>,
    serializer: S,
    shutdown: CancellationToken,
    logger: Dispatch,
) where
    M: Method,
    P: Performer<M>,
    S: Serializer,
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (sink, mut requests) = Framed::new(io, codec).split();
    let (order, invocations) = mpsc::channel::<Invocation<M::Response>>(MAX_IN_FLIGHT);

    let writer = tokio::spawn(
        write_in_order::<M::Response, S, T>(sink, invocations, serializer.clone(), shutdown.clone())
            .in_current_span()
            .with_subscriber(logger.clone()),
    );

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(%peer, "server stopping, closing connection");
                break;
            }
            frame = requests.next() => frame,
        };

        let payload = match frame {
            Some(Ok(payload)) => payload,
            Some(Err(err)) => {
                warn!(%peer, error = %err, "unreadable stream, closing connection");
                break;
            }
            None => {
                debug!(%peer, "peer closed connection");
                break;
            }
        };

        let method = match serializer.decode::<M>(&payload) {
            Ok(method) => method,
            Err(err) => {
                warn!(%peer, error = %err, "undecodable request, closing connection");
                break;
            }
        };

        let performer = Arc::clone(&performer);
        let invocation = tokio::spawn(
            async move { performer.perform(method).await }
                .in_current_span()
                .with_subscriber(logger.clone()),
        );
        if let Err(mpsc::error::SendError(invocation)) = order.send(invocation).await {
            invocation.abort();
            break;
        }
    }

    drop(order);
    drop(requests);
    if let Err(err) = writer.await {
        error!(%peer, error = %err, "response writer failed");
    }
}

/// Write each invocation's outcome in arrival order. Invocations left
/// unwritten when this returns are aborted.
async fn write_in_order<R, S, T>(
    sink: SplitSink<Framed<T, NulCodec>, Bytes>,
    mut invocations: mpsc::Receiver<Invocation<R>>,
    serializer: S,
    shutdown: CancellationToken,
) where
    R: serde::Serialize,
    S: Serializer,
    T: AsyncRead + AsyncWrite,
{
    write_outcomes(sink, &mut invocations, &serializer, &shutdown).await;

    invocations.close();
    let mut aborted = 0usize;
    while let Ok(invocation) = invocations.try_recv() {
        invocation.abort();
        aborted += 1;
    }
    if aborted > 0 {
        debug!(aborted, "aborted unwritten invocations");
    }
}

async fn write_outcomes<R, S, T>(
    mut sink: SplitSink<Framed<T, NulCodec>, Bytes>,
    invocations: &mut mpsc::Receiver<Invocation<R>>,
    serializer: &S,
    shutdown: &CancellationToken,
) where
    R: serde::Serialize,
    S: Serializer,
    T: AsyncRead + AsyncWrite,
{
    loop {
        let mut invocation = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            next = invocations.recv() => match next {
                Some(invocation) => invocation,
                None => break,
            },
        };

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                invocation.abort();
                return;
            }
            outcome = &mut invocation => outcome,
        };

        let Some(payload) = encode_outcome(serializer, outcome) else {
            break;
        };
        if let Err(err) = sink.send(payload).await {
            warn!(error = %err, "failed to write response, closing connection");
            return;
        }
    }

    if let Err(err) = sink.close().await {
        debug!(error = %err, "error closing connection");
    }
}

fn encode_outcome<R, S>(
    serializer: &S,
    outcome: Result<Result<R, BoxError>, JoinError>,
) -> Option<Bytes>
where
    R: serde::Serialize,
    S: Serializer,
{
    let response = match outcome {
        Ok(result) => Response::from_outcome(result),
        Err(err) => {
            error!(error = %err, "method invocation did not complete");
            Response::Error(format!("method invocation did not complete: {err}"))
        }
    };

    match serializer.encode(&response) {
        Ok(payload) => Some(payload),
        Err(err) => {
            error!(error = %err, "failed to encode response");
            // Keep the client's queue aligned with an error in this slot.
            serializer
                .encode(&Response::<R>::Error(err.to_string()))
                .ok()
        }
    }
}
