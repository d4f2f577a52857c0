//! Pool built on first use.
//!
//! [`LazyPool`] holds a configuration source and a connector until the
//! first [`get`](LazyPool::get). Initialization runs exactly once; callers
//! racing on the first `get` all await the same attempt. A failed attempt
//! is final and every later call reports it as [`Error::NotReady`].

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::config::ConfigSource;
use crate::connection::Connector;
use crate::error::{Error, Result};
use crate::pool::Pool;

/// Initialization state of a [`LazyPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LazyState {
    /// `get` has not completed yet.
    Uninitialized,
    /// The pool is constructed and usable.
    Ready,
    /// Initialization failed; the reason is kept for every later caller.
    Failed(String),
}

/// A [`Pool`] constructed on the first call to [`get`](Self::get).
pub struct LazyPool<C: Connector> {
    pending: Mutex<Option<(ConfigSource, C)>>,
    cell: OnceCell<std::result::Result<Pool<C>, String>>,
}

impl<C: Connector> LazyPool<C> {
    /// Defer construction until first use.
    pub fn new(source: impl Into<ConfigSource>, connector: C) -> Self {
        Self {
            pending: Mutex::new(Some((source.into(), connector))),
            cell: OnceCell::new(),
        }
    }

    /// Get the pool, initializing it if this is the first call.
    ///
    /// # Errors
    /// [`Error::NotReady`] if initialization failed, now or on an earlier
    /// call. The attempt is not repeated.
    pub async fn get(&self) -> Result<&Pool<C>> {
        match self.cell.get_or_init(|| self.initialize()).await {
            Ok(pool) => Ok(pool),
            Err(reason) => Err(Error::NotReady {
                reason: reason.clone(),
            }),
        }
    }

    /// Current initialization state.
    #[must_use]
    pub fn state(&self) -> LazyState {
        match self.cell.get() {
            None => LazyState::Uninitialized,
            Some(Ok(_)) => LazyState::Ready,
            Some(Err(reason)) => LazyState::Failed(reason.clone()),
        }
    }

    /// Shut the pool down if it was ever constructed.
    pub async fn shutdown(&self) {
        if let Some(Ok(pool)) = self.cell.get() {
            pool.shutdown().await;
        }
    }

    async fn initialize(&self) -> std::result::Result<Pool<C>, String> {
        // Taken by the first attempt. If that attempt was cancelled before
        // finishing, the connector is gone and the pool can never be built.
        let pending = self.pending.lock().take();
        let Some((source, connector)) = pending else {
            return Err("an earlier initialization was abandoned before completing".to_owned());
        };

        let built = match source.load().await {
            Ok(config) => Pool::connect(config, connector).await,
            Err(error) => Err(error),
        };
        built.map_err(|error| {
            tracing::error!(%error, "connection pool initialization failed");
            error.to_string()
        })
    }
}

impl<C: Connector> fmt::Debug for LazyPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPool")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::PoolConfig;
    use crate::testing::MockConnector;

    fn config() -> PoolConfig {
        PoolConfig {
            initial_size: 2,
            max_size: 4,
            acquire_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn nothing_opens_before_first_get() {
        let connector = MockConnector::new();
        let lazy = LazyPool::new(config(), connector.clone());

        assert_eq!(lazy.state(), LazyState::Uninitialized);
        assert_eq!(connector.opened(), 0);

        let pool = lazy.get().await.unwrap();
        assert_eq!(pool.stats().live, 2);
        assert_eq!(lazy.state(), LazyState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_initialize_once() {
        let connector = MockConnector::new().with_latency(Duration::from_millis(20));
        let lazy = Arc::new(LazyPool::new(config(), connector.clone()));

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                tokio::spawn(async move { lazy.get().await.map(|pool| pool.stats().created) })
            })
            .collect();
        for call in calls {
            assert_eq!(call.await.unwrap().unwrap(), 2);
        }

        assert_eq!(connector.opened(), 2);
        lazy.shutdown().await;
    }

    #[tokio::test]
    async fn failure_is_sticky() {
        let connector = MockConnector::new();
        connector.fail_next(1);
        let lazy = LazyPool::new(config(), connector.clone());

        let first = lazy.get().await.unwrap_err();
        assert!(matches!(first, Error::NotReady { .. }));
        let second = lazy.get().await.unwrap_err();
        assert!(matches!(second, Error::NotReady { .. }));

        assert!(matches!(lazy.state(), LazyState::Failed(reason) if reason.contains("connect")));
        assert_eq!(connector.failures(), 1);
    }

    #[tokio::test]
    async fn bad_inline_source_fails() {
        let lazy = LazyPool::new(
            ConfigSource::Inline("initSize=3\nmaxSize=1\n".to_owned()),
            MockConnector::new(),
        );
        let err = lazy.get().await.unwrap_err();
        assert!(err.to_string().contains("not ready"));
        assert!(matches!(lazy.state(), LazyState::Failed(_)));
    }
}
