//! RAII guard for borrowed connections

use std::fmt;
use std::sync::Arc;

use crate::connection::{Connection, close_detached};
use crate::handle::Handle;
use crate::queue::ResourceQueue;

/// A connection checked out of the pool.
///
/// Dereferences to the connection. When the guard is dropped, on every exit
/// path including unwinding, the connection goes back to the tail of the
/// idle queue with a fresh idle timestamp and waiters are woken. If the
/// pool was shut down in the meantime the connection is closed instead.
pub struct PooledConnection<T: Connection> {
    handle: Option<Handle<T>>,
    queue: Arc<ResourceQueue<T>>,
}

impl<T: Connection> PooledConnection<T> {
    pub(crate) fn new(handle: Handle<T>, queue: Arc<ResourceQueue<T>>) -> Self {
        Self {
            handle: Some(handle),
            queue,
        }
    }

    fn handle(&self) -> &Handle<T> {
        self.handle
            .as_ref()
            .expect("connection is present until the guard drops")
    }
}

impl<T: Connection> std::ops::Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle().connection
    }
}

impl<T: Connection> std::ops::DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self
            .handle
            .as_mut()
            .expect("connection is present until the guard drops")
            .connection
    }
}

impl<T: Connection> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Some(connection) = self.queue.release(handle) else {
            return;
        };

        tracing::debug!("closing connection returned after shutdown");
        close_detached(vec![connection]);
    }
}

impl<T: Connection + fmt::Debug> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.handle.as_ref().map(|h| &h.connection))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MockConnection;

    fn queue_with(ids: &[u64]) -> Arc<ResourceQueue<MockConnection>> {
        let queue = Arc::new(ResourceQueue::new(ids.len()));
        queue.seed(ids.iter().map(|&id| MockConnection::detached(id)));
        queue
    }

    async fn checkout(queue: &Arc<ResourceQueue<MockConnection>>) -> PooledConnection<MockConnection> {
        let handle = queue.pop_or_wait(Duration::from_millis(10)).await.unwrap();
        PooledConnection::new(handle, Arc::clone(queue))
    }

    #[tokio::test]
    async fn drop_returns_connection_once() {
        let queue = queue_with(&[1]);
        let guard = checkout(&queue).await;
        assert_eq!(guard.id(), 1);
        assert_eq!(queue.stats().checked_out, 1);

        drop(guard);
        let stats = queue.stats();
        assert_eq!((stats.idle, stats.checked_out, stats.releases), (1, 0, 1));
    }

    #[tokio::test]
    async fn error_path_still_returns_connection() {
        async fn failing_work(queue: &Arc<ResourceQueue<MockConnection>>) -> Result<(), &'static str> {
            let _conn = checkout(queue).await;
            let outcome: Result<(), &'static str> = Err("query failed");
            outcome?;
            Ok(())
        }

        let queue = queue_with(&[1]);
        assert!(failing_work(&queue).await.is_err());
        assert_eq!(queue.stats().idle, 1);
    }

    #[tokio::test]
    async fn panic_unwinding_returns_connection() {
        let queue = queue_with(&[1]);
        let guard = checkout(&queue).await;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("borrower panicked");
        }));
        assert!(result.is_err());
        assert_eq!(queue.stats().idle, 1);
    }

    #[tokio::test]
    async fn drop_after_close_closes_connection() {
        let queue = queue_with(&[1]);
        let guard = checkout(&queue).await;
        let closed = guard.closed_flag();
        queue.close();

        drop(guard);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(queue.stats().live, 0);
    }
}
