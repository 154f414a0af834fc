use std::fmt;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Pending-connection backlog for listening sockets.
const LISTEN_BACKLOG: u32 = 1024;

/// A caller-supplied host and port.
///
/// The host may be a literal IP address or a name; names are resolved on
/// every [`connect`] so a restarted peer on a new address is picked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Resolve an endpoint into the socket addresses to try, in resolver order.
pub async fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|source| TransportError::Resolve {
            endpoint: endpoint.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::NoAddress(endpoint.to_string()));
    }
    Ok(addrs)
}

fn socket_for(addr: &SocketAddr) -> std::io::Result<TcpSocket> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    Ok(socket)
}

/// Make one connection attempt to `endpoint`.
///
/// Every resolved address is tried in order; the error of the last address
/// is returned when none accepts.
pub async fn connect(endpoint: &Endpoint) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in resolve(endpoint).await? {
        let attempt = match socket_for(&addr) {
            Ok(socket) => socket.connect(addr).await,
            Err(err) => Err(err),
        };
        match attempt {
            Ok(stream) => {
                debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(source) => {
                debug!(%addr, error = %source, "connect attempt failed");
                last_err = Some(TransportError::Connect { addr, source });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| TransportError::NoAddress(endpoint.to_string())))
}

/// Bind and listen on the first address `endpoint` resolves to.
pub async fn bind(endpoint: &Endpoint) -> Result<TcpListener> {
    let addrs = resolve(endpoint).await?;
    let addr = addrs[0];

    let listener = socket_for(&addr)
        .and_then(|socket| {
            socket.bind(addr)?;
            socket.listen(LISTEN_BACKLOG)
        })
        .map_err(|source| TransportError::Bind { addr, source })?;

    let local = listener.local_addr().unwrap_or(addr);
    info!(addr = %local, "listening");
    Ok(listener)
}

/// Accept one connection and apply server-side socket options.
pub async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr)> {
    let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
    stream.set_nodelay(true)?;
    debug!(%peer, "accepted connection");
    Ok((stream, peer))
}
