//! Background task that shrinks the pool back to its floor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::queue::ResourceQueue;

/// Every `max_idle`, closes idle connections that have been idle for at
/// least `max_idle`, oldest first, while more than `floor` are live.
pub(crate) struct IdleReaper<T> {
    queue: Arc<ResourceQueue<T>>,
    floor: usize,
    max_idle: Duration,
    cancel: CancellationToken,
}

impl<T: Connection> IdleReaper<T> {
    pub(crate) fn new(
        queue: Arc<ResourceQueue<T>>,
        floor: usize,
        max_idle: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            floor,
            max_idle,
            cancel,
        }
    }

    pub(crate) fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let start = tokio::time::Instant::now() + self.max_idle;
        let mut ticks = tokio::time::interval_at(start, self.max_idle);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticks.tick() => {}
            }
            if self.queue.is_closed() {
                break;
            }
            self.sweep().await;
        }

        tracing::debug!("idle reaper stopped");
    }

    async fn sweep(&self) -> usize {
        let evicted = self.queue.evict_expired(self.floor, self.max_idle);
        let count = evicted.len();
        for connection in evicted {
            if let Err(error) = connection.close().await {
                tracing::warn!(%error, "failed to close idle connection");
            }
        }
        if count > 0 {
            let stats = self.queue.stats();
            tracing::debug!(
                evicted = count,
                live = stats.live,
                idle = stats.idle,
                "reaped idle connections"
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::MockConnection;

    #[tokio::test(start_paused = true)]
    async fn sweep_closes_only_surplus() {
        let queue = Arc::new(ResourceQueue::new(4));
        let connections: Vec<_> = (0..4).map(MockConnection::detached).collect();
        let flags: Vec<_> = connections.iter().map(MockConnection::closed_flag).collect();
        queue.seed(connections);
        tokio::time::advance(Duration::from_secs(2)).await;

        let reaper = IdleReaper::new(
            Arc::clone(&queue),
            2,
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        assert_eq!(reaper.sweep().await, 2);

        let closed: Vec<_> = flags.iter().map(|f| f.load(Ordering::SeqCst)).collect();
        assert_eq!(closed, vec![true, true, false, false]);
        assert_eq!(queue.stats().live, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_pass_waits_one_period() {
        let queue = Arc::new(ResourceQueue::new(3));
        queue.seed((0..3).map(MockConnection::detached));
        let cancel = CancellationToken::new();
        let task = IdleReaper::new(Arc::clone(&queue), 1, Duration::from_secs(1), cancel.clone())
            .start();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(queue.stats().live, 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(queue.stats().live, 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_recently_returned_connections() {
        let queue = Arc::new(ResourceQueue::new(3));
        queue.seed((0..3).map(MockConnection::detached));
        let held = queue.pop_or_wait(Duration::from_millis(10)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        queue.release(held);

        let reaper = IdleReaper::new(
            Arc::clone(&queue),
            0,
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        assert_eq!(reaper.sweep().await, 2);
        assert_eq!(queue.stats().live, 1);
    }
}
