//! Connection capability consumed by the pool.
//!
//! The pool never speaks the backend's wire protocol. It only opens
//! connections through a [`Connector`] and closes them through
//! [`Connection::close`]; what happens in between belongs to the borrower.

use std::future::Future;

use crate::config::{Credentials, Endpoint};
use crate::error::Result;

/// An established backend connection.
///
/// A connection is considered alive from the moment `open` returns it until
/// the pool calls `close`.
pub trait Connection: Send + 'static {
    /// Close the connection. Called exactly once, by the reaper or on shutdown.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens new connections for the pool.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Open a connection to `endpoint`, authenticating with `credentials`.
    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// Close `connections` on the current runtime without waiting for them.
///
/// Used from `Drop`, where nothing can be awaited. Outside a runtime the
/// connections are dropped, which still releases their transports.
pub(crate) fn close_detached<T: Connection>(connections: Vec<T>) {
    if connections.is_empty() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            drop(runtime.spawn(async move {
                for connection in connections {
                    if let Err(error) = connection.close().await {
                        tracing::warn!(%error, "failed to close connection");
                    }
                }
            }));
        }
        Err(_) => drop(connections),
    }
}
