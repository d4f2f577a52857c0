//! Plain TCP connector.
//!
//! Opens a [`TcpStream`] to `host:port`. No handshake is performed, so the
//! credentials are not sent anywhere; protocols layered on top own that.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::{Credentials, Endpoint};
use crate::connection::{Connection, Connector};
use crate::error::{Error, Result};

/// [`Connector`] producing raw TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Connector without a dial timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a dial after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    async fn open(&self, endpoint: &Endpoint, _credentials: &Credentials) -> Result<TcpConnection> {
        let dial = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let dialed = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, dial).await.map_err(|_| {
                Error::connect(
                    endpoint,
                    format!("dial timed out after {}ms", limit.as_millis()),
                )
            })?,
            None => dial.await,
        };
        let stream = dialed.map_err(|e| Error::connect_with(endpoint, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::connect_with(endpoint, e))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| Error::connect_with(endpoint, e))?;

        tracing::debug!(%peer, "tcp connection established");
        Ok(TcpConnection { stream, peer })
    }
}

/// An open TCP stream owned by the pool.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    /// Address of the remote end.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The underlying stream.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// The underlying stream, for reads and writes.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

impl Connection for TcpConnection {
    async fn close(mut self) -> Result<()> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            // Remote end already went away.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::connect_with(self.peer, e)),
        }
    }
}
