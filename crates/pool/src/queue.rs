//! Bounded idle queue: the pool's monitor.
//!
//! One mutex guards the idle deque together with every count (`live`,
//! `pending`, `waiting`) so they change as a unit. One [`Notify`] is
//! broadcast (`notify_waiters`) on every queue transition; waiters arm
//! their notification *before* checking the predicate so a transition
//! between check and wait is never lost, and always re-check after waking
//! because another waiter may have taken the handle first.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::stats::PoolStats;

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    destroyed: u64,
    acquisitions: u64,
    releases: u64,
    timeouts: u64,
    connect_failures: u64,
}

struct QueueState<T> {
    /// Head is the least recently returned handle.
    idle: VecDeque<Handle<T>>,
    /// Open connections: idle plus checked out.
    live: usize,
    /// Slots reserved by the replenisher while a connection is opening.
    pending: usize,
    /// Callers blocked in `pop_or_wait`.
    waiting: usize,
    closed: bool,
    counters: Counters,
}

impl<T> QueueState<T> {
    fn retire(&mut self, count: usize) {
        debug_assert!(self.live >= count, "retiring more handles than are live");
        self.live -= count;
        self.counters.destroyed += count as u64;
    }
}

pub(crate) struct ResourceQueue<T> {
    state: Mutex<QueueState<T>>,
    signal: Notify,
    max_size: usize,
}

impl<T> ResourceQueue<T> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                idle: VecDeque::new(),
                live: 0,
                pending: 0,
                waiting: 0,
                closed: false,
                counters: Counters::default(),
            }),
            signal: Notify::new(),
            max_size,
        }
    }

    /// Load freshly opened connections, counting them as live.
    pub(crate) fn seed(&self, connections: impl IntoIterator<Item = T>) {
        let mut state = self.state.lock();
        for connection in connections {
            state.idle.push_back(Handle::new(connection));
            state.live += 1;
            state.counters.created += 1;
        }
        self.debug_check(&state);
        drop(state);
        self.signal.notify_waiters();
    }

    /// Take the head handle, waiting up to `timeout` for one to appear.
    ///
    /// While blocked the caller is counted in `waiting`, which is what wakes
    /// the replenisher. The registration is withdrawn on every exit path,
    /// including the future being dropped mid-wait.
    pub(crate) async fn pop_or_wait(&self, timeout: Duration) -> Result<Handle<T>> {
        let deadline = Instant::now() + timeout;
        let mut waiter = Waiter {
            queue: self,
            registered: false,
        };

        loop {
            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(handle) = self.try_pop(&mut waiter)? {
                return Ok(handle);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // The budget is spent; a handle pushed right at the deadline still counts.
                if let Some(handle) = self.try_pop(&mut waiter)? {
                    return Ok(handle);
                }
                let mut state = self.state.lock();
                waiter.deregister(&mut state);
                state.counters.timeouts += 1;
                return Err(Error::AcquireTimeout { timeout });
            }
        }
    }

    fn try_pop(&self, waiter: &mut Waiter<'_, T>) -> Result<Option<Handle<T>>> {
        let mut state = self.state.lock();
        if state.closed {
            waiter.deregister(&mut state);
            return Err(Error::ShutDown);
        }
        if let Some(handle) = state.idle.pop_front() {
            waiter.deregister(&mut state);
            state.counters.acquisitions += 1;
            drop(state);
            self.signal.notify_waiters();
            return Ok(Some(handle));
        }
        let newly_waiting = waiter.register(&mut state);
        drop(state);
        if newly_waiting {
            self.signal.notify_waiters();
        }
        Ok(None)
    }

    /// Return a borrowed handle to the tail with a fresh idle timestamp.
    ///
    /// If the pool has been closed the handle is retired instead and its
    /// connection handed back so the caller can close it.
    pub(crate) fn release(&self, mut handle: Handle<T>) -> Option<T> {
        let mut state = self.state.lock();
        state.counters.releases += 1;
        if state.closed {
            state.retire(1);
            return Some(handle.connection);
        }
        handle.touch();
        state.idle.push_back(handle);
        self.debug_check(&state);
        drop(state);
        self.signal.notify_waiters();
        None
    }

    /// Wait until a caller is blocked on an empty queue and there is room
    /// under the ceiling, then reserve one slot for a new connection.
    ///
    /// Returns `None` once the queue is closed.
    pub(crate) async fn reserve_on_demand(&self) -> Option<Reservation<'_, T>> {
        loop {
            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if state.idle.is_empty()
                    && state.waiting > 0
                    && state.live + state.pending < self.max_size
                {
                    state.pending += 1;
                    return Some(Reservation {
                        queue: self,
                        armed: true,
                    });
                }
            }

            notified.await;
        }
    }

    /// Pop idle handles from the head while they have been idle for at
    /// least `max_idle` and more than `floor` connections are live.
    ///
    /// Head-to-tail idle timestamps are non-decreasing, so the first head
    /// that is still fresh ends the pass.
    pub(crate) fn evict_expired(&self, floor: usize, max_idle: Duration) -> Vec<T> {
        let mut evicted = Vec::new();
        let mut state = self.state.lock();
        while state.live > floor
            && state
                .idle
                .front()
                .is_some_and(|handle| handle.idle_for() >= max_idle)
        {
            let Some(handle) = state.idle.pop_front() else {
                break;
            };
            state.retire(1);
            evicted.push(handle.connection);
        }
        self.debug_check(&state);
        drop(state);
        if !evicted.is_empty() {
            self.signal.notify_waiters();
        }
        evicted
    }

    /// Mark the queue closed and hand back every idle connection.
    ///
    /// Blocked callers wake and fail with [`Error::ShutDown`].
    pub(crate) fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let drained: Vec<T> = state.idle.drain(..).map(|handle| handle.connection).collect();
        state.retire(drained.len());
        drop(state);
        self.signal.notify_waiters();
        drained
    }

    /// Resolves on the next queue transition after it is first polled.
    pub(crate) fn changed(&self) -> Notified<'_> {
        self.signal.notified()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.idle.len(),
            live: state.live,
            checked_out: state.live - state.idle.len(),
            pending: state.pending,
            waiting: state.waiting,
            max_size: self.max_size,
            oldest_idle: state.idle.front().map(Handle::idle_for),
            created: state.counters.created,
            destroyed: state.counters.destroyed,
            acquisitions: state.counters.acquisitions,
            releases: state.counters.releases,
            timeouts: state.counters.timeouts,
            connect_failures: state.counters.connect_failures,
        }
    }

    fn debug_check(&self, state: &MutexGuard<'_, QueueState<T>>) {
        debug_assert!(state.idle.len() <= state.live);
        debug_assert!(state.live + state.pending <= self.max_size);
        debug_assert!(
            state
                .idle
                .iter()
                .zip(state.idle.iter().skip(1))
                .all(|(a, b)| a.idle_since() <= b.idle_since()),
            "idle timestamps out of order"
        );
    }
}

/// A caller's registration in `waiting`, withdrawn exactly once.
struct Waiter<'a, T> {
    queue: &'a ResourceQueue<T>,
    registered: bool,
}

impl<T> Waiter<'_, T> {
    fn register(&mut self, state: &mut QueueState<T>) -> bool {
        if self.registered {
            return false;
        }
        state.waiting += 1;
        self.registered = true;
        true
    }

    fn deregister(&mut self, state: &mut QueueState<T>) {
        if self.registered {
            state.waiting -= 1;
            self.registered = false;
        }
    }
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        if self.registered {
            self.queue.state.lock().waiting -= 1;
        }
    }
}

/// A slot under the ceiling held while the replenisher opens a connection.
///
/// Dropping an unfulfilled reservation gives the slot back.
pub(crate) struct Reservation<'a, T> {
    queue: &'a ResourceQueue<T>,
    armed: bool,
}

impl<T> Reservation<'_, T> {
    /// Push the newly opened connection to the tail and count it as live.
    ///
    /// Hands the connection back if the queue was closed meanwhile.
    pub(crate) fn fulfil(mut self, connection: T) -> Option<T> {
        self.armed = false;
        let mut state = self.queue.state.lock();
        state.pending -= 1;
        if state.closed {
            return Some(connection);
        }
        state.idle.push_back(Handle::new(connection));
        state.live += 1;
        state.counters.created += 1;
        self.queue.debug_check(&state);
        drop(state);
        self.queue.signal.notify_waiters();
        None
    }

    /// Give the slot back after a failed connect.
    pub(crate) fn fail(mut self) {
        self.armed = false;
        let mut state = self.queue.state.lock();
        state.pending -= 1;
        state.counters.connect_failures += 1;
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.state.lock().pending -= 1;
        }
    }
}
