//! Point-in-time pool statistics.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Error, Result};

/// Snapshot of pool occupancy and lifetime counters, taken under the pool lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolStats {
    /// Connections sitting idle in the queue.
    pub idle: usize,
    /// Connections open, idle or checked out.
    pub live: usize,
    /// Connections currently held by borrowers.
    pub checked_out: usize,
    /// Connections being opened by the replenisher.
    pub pending: usize,
    /// Callers blocked in `acquire`.
    pub waiting: usize,
    /// Configured ceiling.
    pub max_size: usize,
    /// How long the head of the queue has been idle.
    pub oldest_idle: Option<Duration>,
    /// Total connections ever opened.
    pub created: u64,
    /// Total connections ever closed by the pool.
    pub destroyed: u64,
    /// Total successful acquisitions.
    pub acquisitions: u64,
    /// Total guards returned.
    pub releases: u64,
    /// Total acquisitions that timed out.
    pub timeouts: u64,
    /// Total failed replenishment attempts.
    pub connect_failures: u64,
}

impl PoolStats {
    /// Verify the occupancy invariants hold for this snapshot.
    pub fn check(&self) -> Result<()> {
        if self.idle > self.live {
            return Err(Error::invariant(format!(
                "idle ({}) exceeds live ({})",
                self.idle, self.live
            )));
        }
        if self.live + self.pending > self.max_size {
            return Err(Error::invariant(format!(
                "live ({}) + pending ({}) exceeds max_size ({})",
                self.live, self.pending, self.max_size
            )));
        }
        if self.live != self.idle + self.checked_out {
            return Err(Error::invariant(format!(
                "live ({}) != idle ({}) + checked_out ({})",
                self.live, self.idle, self.checked_out
            )));
        }
        Ok(())
    }
}
