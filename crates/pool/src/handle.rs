//! Pool entry: a live connection plus the instant it last became idle.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct Handle<T> {
    pub(crate) connection: T,
    idle_since: Instant,
}

impl<T> Handle<T> {
    pub(crate) fn new(connection: T) -> Self {
        Self {
            connection,
            idle_since: Instant::now(),
        }
    }

    /// Restart the idle clock. Must be called under the queue lock so tail
    /// timestamps never go backwards.
    pub(crate) fn touch(&mut self) {
        self.idle_since = Instant::now();
    }

    pub(crate) fn idle_since(&self) -> Instant {
        self.idle_since
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.idle_since.elapsed()
    }
}
