//! Occupancy counters.

use serde::Serialize;

/// Snapshot of a pool's occupancy counters.
///
/// The live copy is mutated only under the pool's critical section; this is
/// a copy taken under that lock, so the five fields are mutually consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Workers allocated and not yet marked for release.
    pub allocated: u32,
    /// Registered workers waiting for work.
    pub idle: u32,
    /// Registered workers doing work.
    pub busy: u32,
    /// Stop signals issued by `release` and not yet claimed by a worker.
    pub pending_release: u32,
    /// Workers that called `register` and have not left.
    pub registered: u32,
}

impl PoolStats {
    /// Returns true if no worker is allocated, registered or pending release.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allocated == 0 && self.registered == 0 && self.pending_release == 0
    }
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "allocated={} idle={} busy={} pending_release={} registered={}",
            self.allocated, self.idle, self.busy, self.pending_release, self.registered
        )
    }
}
