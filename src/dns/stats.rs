//! Query accounting for the DNS gatekeeper.

use parking_lot::RwLock;

/// Point-in-time copy of the query counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounts {
    pub total: u64,
    pub blocked: u64,
}

/// Monotonic query counters, reset only by restarting the process.
#[derive(Debug, Default)]
pub struct QueryStats {
    counts: RwLock<QueryCounts>,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one question, and one block if `blocked`.
    pub fn record(&self, blocked: bool) {
        let mut counts = self.counts.write();
        counts.total += 1;
        if blocked {
            counts.blocked += 1;
        }
    }

    pub fn snapshot(&self) -> QueryCounts {
        *self.counts.read()
    }
}
