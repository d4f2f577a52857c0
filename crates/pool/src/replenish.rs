//! Background task that grows the pool on demand.
//!
//! The [`Replenisher`] sleeps until a caller is blocked on an empty queue,
//! reserves one slot under the ceiling, opens a connection outside the
//! lock and pushes it to the tail. When the pool is saturated it does
//! nothing and callers run into their acquire timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::connection::{Connection, Connector};
use crate::queue::ResourceQueue;

pub(crate) struct Replenisher<C: Connector> {
    connector: Arc<C>,
    config: Arc<PoolConfig>,
    queue: Arc<ResourceQueue<C::Connection>>,
    cancel: CancellationToken,
}

impl<C: Connector> Replenisher<C> {
    pub(crate) fn new(
        connector: Arc<C>,
        config: Arc<PoolConfig>,
        queue: Arc<ResourceQueue<C::Connection>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            config,
            queue,
            cancel,
        }
    }

    /// Spawn the task. It exits when the token is cancelled or the queue closes.
    pub(crate) fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        // After a failed connect, retry on the next queue transition or once
        // this much time has passed, whichever comes first.
        let retry_pause = self.config.acquire_timeout;

        loop {
            let reservation = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                reservation = self.queue.reserve_on_demand() => match reservation {
                    Some(reservation) => reservation,
                    None => break,
                },
            };

            let opened = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                opened = self.connector.open(&self.config.endpoint, &self.config.credentials) => opened,
            };

            match opened {
                Ok(connection) => {
                    let stats = self.queue.stats();
                    tracing::debug!(
                        endpoint = %self.config.endpoint,
                        live = stats.live + 1,
                        waiting = stats.waiting,
                        "opened connection on demand"
                    );
                    if let Some(connection) = reservation.fulfil(connection) {
                        close_quietly(connection).await;
                        break;
                    }
                }
                Err(error) => {
                    reservation.fail();
                    tracing::warn!(
                        endpoint = %self.config.endpoint,
                        %error,
                        "replenishment failed to open a connection"
                    );
                    self.pause(retry_pause).await;
                }
            }
        }

        tracing::debug!("replenisher stopped");
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = self.queue.changed() => {}
            () = tokio::time::sleep(duration) => {}
        }
    }
}

async fn close_quietly<T: Connection>(connection: T) {
    if let Err(error) = connection.close().await {
        tracing::warn!(%error, "failed to close connection");
    }
}
