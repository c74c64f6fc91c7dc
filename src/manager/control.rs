//! The manager's control loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use super::{IdleLevels, ManagerState, ResourceManager, ResourcePool};
use crate::error::{panic_message, Result};
use crate::observability::PoolEvent;

/// One armed control loop, created by [`ResourceManager::control_loop`].
///
/// The loop owns the idle-level table and the sample countdown. Each
/// [`tick`](Self::tick) performs one decision step; [`run`](Self::run)
/// ticks on the configured period until the manager stops.
pub struct ControlLoop {
    manager: ResourceManager,
    pool: Arc<dyn ResourcePool>,
    levels: IdleLevels,
    countdown: u64,
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("manager", &self.manager)
            .field("levels", &self.levels)
            .field("countdown", &self.countdown)
            .finish_non_exhaustive()
    }
}

impl ControlLoop {
    pub(super) fn new(manager: ResourceManager, pool: Arc<dyn ResourcePool>) -> Self {
        let config = manager.config();
        let levels = IdleLevels::new(config.max);
        let countdown = config.initial_sample_ticks();
        Self {
            manager,
            pool,
            levels,
            countdown,
        }
    }

    /// Returns the idle-level table.
    #[must_use]
    pub fn levels(&self) -> &IdleLevels {
        &self.levels
    }

    /// Returns the manager this loop drives.
    #[must_use]
    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    /// Runs one decision step at time `now` and returns the resulting state.
    ///
    /// 1. Prune dead resources.
    /// 2. Snapshot `(allocated, idle)`.
    /// 3. Running: grow toward `threshold`, or sample idleness and shrink.
    ///    Draining: release idle resources until none are allocated.
    pub fn tick(&mut self, now: Instant) -> ManagerState {
        if self.manager.state() == ManagerState::Stopped {
            return ManagerState::Stopped;
        }

        self.invoke("prune", |pool| pool.prune());

        let snapshot = self.manager.snapshot();
        tracing::debug!(
            allocated = snapshot.allocated,
            idle = snapshot.idle,
            state = ?snapshot.state,
            "control tick"
        );
        match snapshot.state {
            ManagerState::Running => self.steer(now, snapshot.allocated, snapshot.idle),
            ManagerState::Draining => self.drain(snapshot.idle),
            ManagerState::Stopped => {}
        }
        self.countdown = self.countdown.saturating_sub(1);
        self.manager.state()
    }

    /// Ticks on the configured period until the manager is stopped.
    pub fn run(mut self) {
        tracing::info!(config = ?self.manager.config(), "control loop running");
        loop {
            let state = self.tick(Instant::now());
            if state == ManagerState::Stopped {
                break;
            }
            self.manager.sleep_tick(state);
        }
        tracing::info!("control loop exited");
    }

    fn steer(&mut self, now: Instant, allocated: u32, idle: u32) {
        let config = self.manager.config();
        let (min, threshold, max) = (config.min, config.threshold, config.max);
        let retention = config.idle_retention;
        let sample_ticks = config.sample_ticks();

        if allocated < max && idle < threshold {
            let n = (threshold - idle).min(max - allocated);
            tracing::info!(n, allocated, idle, "growing pool");
            self.invoke("allocate", |pool| pool.allocate(n));
            return;
        }

        let expired = self.levels.expire(now, retention);
        if expired > 0 {
            tracing::debug!(expired, "idle levels aged out");
        }
        if self.countdown > 0 {
            return;
        }
        self.countdown = sample_ticks;

        let level = self.manager.take_window_min();
        self.levels.stamp(level, now);
        tracing::debug!(level, fresh = ?self.levels.fresh_levels(), "idle level sampled");
        self.manager.emit(&PoolEvent::IdleSampled { level });

        let Some(lowest) = self.levels.lowest_fresh() else {
            return;
        };
        if lowest > threshold && allocated > min {
            let target = allocated.saturating_sub(lowest - threshold).max(min);
            let n = allocated - target;
            tracing::info!(n, allocated, lowest, threshold, "shrinking pool");
            self.invoke("release", |pool| pool.release(n));
        }
    }

    fn drain(&mut self, idle: u32) {
        if idle > 0 {
            tracing::debug!(idle, "draining idle resources");
            self.invoke("release", |pool| pool.release(idle));
        }
        if self.manager.snapshot().allocated == 0 {
            self.manager
                .set_state(ManagerState::Draining, ManagerState::Stopped);
        }
    }

    fn invoke(&self, callback: &'static str, f: impl FnOnce(&dyn ResourcePool) -> Result<()>) {
        let pool = self.pool.as_ref();
        let error = match catch_unwind(AssertUnwindSafe(|| f(pool))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        tracing::warn!(callback, %error, "pool callback failed");
        self.manager
            .emit(&PoolEvent::CallbackFailed { callback, error });
    }
}
