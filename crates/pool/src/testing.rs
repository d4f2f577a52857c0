//! In-memory connector for tests, demos and dry runs.
//!
//! [`MockConnector`] hands out [`MockConnection`]s and keeps shared counters
//! (opened, closed, currently open, peak open) so callers can assert on the
//! pool's behaviour from outside. Clones share the same counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{Credentials, Endpoint};
use crate::connection::{Connection, Connector};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
    failures: AtomicU64,
}

#[derive(Debug, Default)]
struct Behaviour {
    latency: Duration,
    fail_next: usize,
    fail_after: Option<usize>,
    failing: bool,
}

/// Connector that fabricates connections in memory.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    counters: Arc<Counters>,
    behaviour: Arc<Mutex<Behaviour>>,
    last_login: Arc<Mutex<Option<String>>>,
}

impl MockConnector {
    /// Create a connector that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `open` by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.behaviour.lock().latency = latency;
        self
    }

    /// Fail the next `count` opens, then succeed again.
    pub fn fail_next(&self, count: usize) {
        self.behaviour.lock().fail_next = count;
    }

    /// Let `successes` more opens succeed, then fail every open.
    pub fn fail_after(&self, successes: usize) {
        self.behaviour.lock().fail_after = Some(successes);
    }

    /// Fail every open until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.behaviour.lock().failing = failing;
    }

    /// Connections opened so far.
    pub fn opened(&self) -> u64 {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    pub fn closed(&self) -> u64 {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Connections open right now.
    pub fn open_now(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of connections that were open at the same time.
    pub fn peak_open(&self) -> usize {
        self.counters.peak_open.load(Ordering::SeqCst)
    }

    /// Opens that were refused.
    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::SeqCst)
    }

    /// Username presented on the most recent successful open.
    pub fn last_login(&self) -> Option<String> {
        self.last_login.lock().clone()
    }

    fn should_fail(&self) -> bool {
        let mut behaviour = self.behaviour.lock();
        if behaviour.failing {
            return true;
        }
        if behaviour.fail_next > 0 {
            behaviour.fail_next -= 1;
            return true;
        }
        match behaviour.fail_after {
            Some(0) => true,
            Some(remaining) => {
                behaviour.fail_after = Some(remaining - 1);
                false
            }
            None => false,
        }
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn open(&self, endpoint: &Endpoint, credentials: &Credentials) -> Result<MockConnection> {
        let latency = self.behaviour.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.should_fail() {
            self.counters.failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::connect(endpoint, "connection refused by mock backend"));
        }

        let id = self.counters.next_id.fetch_add(1, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let open = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_open.fetch_max(open, Ordering::SeqCst);
        *self.last_login.lock() = Some(credentials.username.clone());

        Ok(MockConnection {
            id,
            closed: Arc::new(AtomicBool::new(false)),
            counters: Some(Arc::clone(&self.counters)),
        })
    }
}

/// Connection produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    closed: Arc<AtomicBool>,
    counters: Option<Arc<Counters>>,
}

impl MockConnection {
    /// A connection not tracked by any connector.
    pub fn detached(id: u64) -> Self {
        Self {
            id,
            closed: Arc::new(AtomicBool::new(false)),
            counters: None,
        }
    }

    /// Sequence number assigned at open; identifies the physical connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Flag that flips to `true` when the pool closes this connection.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Connection for MockConnection {
    async fn close(self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst)
            && let Some(counters) = &self.counters
        {
            counters.closed.fetch_add(1, Ordering::SeqCst);
            counters.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
