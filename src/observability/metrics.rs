//! Lifetime counters for a worker pool.
//!
//! The live occupancy counters belong to the pool's critical section (see
//! [`PoolStats`](crate::pool::PoolStats)). The counters here only ever grow
//! and are updated with relaxed atomics outside any lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    /// Increments the counter by 1.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds a value to the counter.
    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Returns the counter name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Lifetime totals recorded by a pool and its manager.
#[derive(Debug)]
pub struct PoolMetrics {
    /// Worker threads successfully spawned.
    pub workers_spawned: Counter,
    /// Workers that deregistered and exited.
    pub workers_exited: Counter,
    /// Workers found dead by the liveness sweep.
    pub workers_died: Counter,
    /// Workers asked to stop by `release`.
    pub workers_released: Counter,
    /// Thread spawns the OS refused.
    pub spawn_failures: Counter,
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self {
            workers_spawned: Counter::new("workers_spawned"),
            workers_exited: Counter::new("workers_exited"),
            workers_died: Counter::new("workers_died"),
            workers_released: Counter::new("workers_released"),
            spawn_failures: Counter::new("spawn_failures"),
        }
    }
}

impl PoolMetrics {
    /// Captures the current totals.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workers_spawned: self.workers_spawned.get(),
            workers_exited: self.workers_exited.get(),
            workers_died: self.workers_died.get(),
            workers_released: self.workers_released.get(),
            spawn_failures: self.spawn_failures.get(),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Worker threads successfully spawned.
    pub workers_spawned: u64,
    /// Workers that deregistered and exited.
    pub workers_exited: u64,
    /// Workers found dead by the liveness sweep.
    pub workers_died: u64,
    /// Workers asked to stop by `release`.
    pub workers_released: u64,
    /// Thread spawns the OS refused.
    pub spawn_failures: u64,
}
