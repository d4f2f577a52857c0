//! Connection pool facade.
//!
//! [`Pool`] owns the configuration, the idle queue and the two background
//! tasks (replenisher and idle reaper). Construction opens the initial
//! connections up front; nothing is handed out until that succeeds.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::connection::{Connection, Connector, close_detached};
use crate::error::{Error, Result};
use crate::guard::PooledConnection;
use crate::queue::ResourceQueue;
use crate::reaper::IdleReaper;
use crate::replenish::Replenisher;
use crate::stats::PoolStats;

/// Lifecycle state of a constructed pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting `acquire` calls.
    Ready,
    /// `shutdown` was called; `acquire` fails with [`Error::ShutDown`](crate::Error::ShutDown).
    ShutDown,
}

/// Inner shared state for the pool.
struct PoolInner<C: Connector> {
    config: Arc<PoolConfig>,
    queue: Arc<ResourceQueue<C::Connection>>,
    /// Stops both background tasks.
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connector> Drop for PoolInner<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Empty if `shutdown` already ran.
        let idle = self.queue.close();
        if !idle.is_empty() {
            tracing::debug!(
                closed = idle.len(),
                "pool dropped without shutdown, closing idle connections"
            );
            close_detached(idle);
        }
    }
}

/// Bounded connection pool.
///
/// Cloning is cheap and every clone refers to the same pool. When the last
/// clone is dropped the background tasks stop and idle connections are closed
/// in the background; call [`shutdown`](Self::shutdown) to wait for both.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: Connector> Pool<C> {
    /// Validate `config`, open `initial_size` connections and start the
    /// background tasks on the current tokio runtime.
    ///
    /// # Errors
    /// [`Error::Configuration`](crate::Error::Configuration) if the config is
    /// invalid; [`Error::Connect`](crate::Error::Connect) if any initial
    /// connection fails, after closing the ones already opened.
    pub async fn connect(config: PoolConfig, connector: C) -> Result<Self> {
        config.validate()?;

        let mut opened = Vec::with_capacity(config.initial_size);
        for _ in 0..config.initial_size {
            match connector.open(&config.endpoint, &config.credentials).await {
                Ok(connection) => opened.push(connection),
                Err(error) => {
                    tracing::warn!(
                        endpoint = %config.endpoint,
                        opened = opened.len(),
                        %error,
                        "initial fill failed, closing opened connections"
                    );
                    for connection in opened {
                        if let Err(error) = connection.close().await {
                            tracing::warn!(%error, "failed to close connection");
                        }
                    }
                    return Err(error);
                }
            }
        }

        let config = Arc::new(config);
        let queue = Arc::new(ResourceQueue::new(config.max_size));
        queue.seed(opened);

        let cancel = CancellationToken::new();
        let replenisher = Replenisher::new(
            Arc::new(connector),
            Arc::clone(&config),
            Arc::clone(&queue),
            cancel.child_token(),
        )
        .start();
        let reaper = IdleReaper::new(
            Arc::clone(&queue),
            config.initial_size,
            config.max_idle,
            cancel.child_token(),
        )
        .start();

        tracing::debug!(
            endpoint = %config.endpoint,
            initial_size = config.initial_size,
            max_size = config.max_size,
            "connection pool ready"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                queue,
                cancel,
                tasks: Mutex::new(vec![replenisher, reaper]),
            }),
        })
    }

    /// Check out an idle connection, waiting up to the configured acquire
    /// timeout for one to be returned or opened.
    ///
    /// Returns an RAII [`PooledConnection`] that puts the connection back
    /// when dropped.
    ///
    /// # Errors
    /// [`Error::AcquireTimeout`](crate::Error::AcquireTimeout) if nothing
    /// became available in time; [`Error::ShutDown`](crate::Error::ShutDown)
    /// after [`shutdown`](Self::shutdown).
    pub async fn acquire(&self) -> Result<PooledConnection<C::Connection>> {
        let inner = &self.inner;
        let timeout = inner.config.acquire_timeout;

        match inner.queue.pop_or_wait(timeout).await {
            Ok(handle) => Ok(PooledConnection::new(handle, Arc::clone(&inner.queue))),
            Err(error) => {
                if matches!(error, Error::AcquireTimeout { .. }) {
                    let stats = inner.queue.stats();
                    tracing::warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        live = stats.live,
                        max_size = stats.max_size,
                        "timed out waiting for an idle connection"
                    );
                }
                Err(error)
            }
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.queue.stats()
    }

    /// Whether the pool still accepts `acquire` calls.
    #[must_use]
    pub fn state(&self) -> PoolState {
        if self.inner.queue.is_closed() {
            PoolState::ShutDown
        } else {
            PoolState::Ready
        }
    }

    /// The settings the pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Shut the pool down.
    ///
    /// Stops the background tasks and waits for them, closes every idle
    /// connection and fails blocked and future `acquire` calls with
    /// [`Error::ShutDown`](crate::Error::ShutDown). Connections still checked
    /// out are closed when their guards drop. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.cancel.cancel();
        let drained = inner.queue.close();

        let tasks = std::mem::take(&mut *inner.tasks.lock());
        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!(%error, "pool background task ended abnormally");
            }
        }

        let count = drained.len();
        for connection in drained {
            if let Err(error) = connection.close().await {
                tracing::warn!(%error, "failed to close idle connection");
            }
        }
        if count > 0 {
            tracing::debug!(closed = count, "connection pool shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MockConnector;

    fn config(initial_size: usize, max_size: usize) -> PoolConfig {
        PoolConfig {
            initial_size,
            max_size,
            max_idle: Duration::from_secs(1),
            acquire_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn connect_fills_initial_size() {
        let connector = MockConnector::new();
        let pool = Pool::connect(config(3, 5), connector.clone()).await.unwrap();

        let stats = pool.stats();
        assert_eq!((stats.live, stats.idle, stats.created), (3, 3, 3));
        assert_eq!(connector.opened(), 3);
        assert_eq!(pool.state(), PoolState::Ready);
    }

    #[tokio::test]
    async fn invalid_config_opens_nothing() {
        let connector = MockConnector::new();
        let err = Pool::connect(config(0, 5), connector.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn failed_initial_fill_closes_partial_work() {
        let connector = MockConnector::new();
        connector.fail_after(2);

        let err = Pool::connect(config(3, 5), connector.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.open_now(), 0);
    }

    #[tokio::test]
    async fn acquire_reuses_same_connection() {
        let pool = Pool::connect(config(1, 1), MockConnector::new()).await.unwrap();

        let first_id = pool.acquire().await.unwrap().id();
        let second_id = pool.acquire().await.unwrap().id();
        assert_eq!(first_id, second_id);
        assert_eq!(pool.stats().created, 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_rejects_acquire() {
        let connector = MockConnector::new();
        let pool = Pool::connect(config(2, 2), connector.clone()).await.unwrap();

        pool.shutdown().await;
        pool.shutdown().await;

        assert_eq!(pool.state(), PoolState::ShutDown);
        assert!(matches!(pool.acquire().await, Err(Error::ShutDown)));
        assert_eq!(connector.closed(), 2);
        assert_eq!(pool.stats().live, 0);
    }

    #[tokio::test]
    async fn dropping_last_clone_cancels_tasks() {
        let pool = Pool::connect(config(1, 2), MockConnector::new()).await.unwrap();
        let cancel = pool.inner.cancel.clone();
        let clone = pool.clone();
        drop(pool);
        assert!(!cancel.is_cancelled());
        drop(clone);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_last_clone_closes_idle_connections() {
        let connector = MockConnector::new();
        let pool = Pool::connect(config(2, 3), connector.clone()).await.unwrap();
        let held = pool.acquire().await.unwrap();

        drop(pool);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.closed(), 1);

        // The pool is gone, so the outstanding connection is closed on return.
        drop(held);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.open_now(), 0);
    }

    #[tokio::test]
    async fn unbounded_ceiling_is_accepted() {
        let config = PoolConfig {
            initial_size: 1,
            max_size: usize::MAX,
            ..Default::default()
        };
        let pool = Pool::connect(config, MockConnector::new()).await.unwrap();

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(pool.stats().max_size, usize::MAX);
    }
}
