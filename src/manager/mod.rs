//! Adaptive sizing for a pool of resources.
//!
//! A [`ResourceManager`] watches two numbers the pool reports through
//! [`ResourceManager::update`]: how many resources are allocated and how
//! many of those are idle. A control loop ([`ControlLoop`]) wakes once per
//! tick and turns those observations into `allocate`, `release` and `prune`
//! commands on the pool's [`ResourcePool`] implementation.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start--> Running --stop--> Draining --allocated == 0--> Stopped
//! ```
//!
//! # Growing and shrinking
//!
//! Growth is immediate: whenever fewer than `threshold` resources are idle
//! and the pool is below `max`, the loop allocates the difference.
//!
//! Shrinking needs evidence. Every sample interval the loop records the
//! lowest idle count seen since the previous sample in an [`IdleLevels`]
//! table. Levels age out after the retention window. If even the smallest
//! level still fresh exceeds `threshold`, that surplus has been idle for the
//! whole window and is released, never dropping below `min`.
//!
//! # Staleness
//!
//! Each tick takes one snapshot of `(allocated, idle)` after pruning and
//! decides from it. Callbacks run with no manager lock held, so the pool
//! may report new counts while a decision is in flight. The next tick sees
//! them; decisions are at most one tick stale.

mod config;
mod control;
mod idle;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

pub use config::{ResourceManagerConfig, MAX_POOL_SIZE};
pub use control::ControlLoop;
pub use idle::IdleLevels;

use crate::error::{Error, Result};
use crate::observability::{emit, EventHook, PoolEvent};

/// Callbacks the manager issues against the pool it sizes.
///
/// Failures are logged by the control loop and never stop it.
pub trait ResourcePool: Send + Sync {
    /// Adds `n` resources.
    fn allocate(&self, n: u32) -> Result<()>;

    /// Retires `n` resources.
    fn release(&self, n: u32) -> Result<()>;

    /// Sweeps out resources that died without deregistering.
    fn prune(&self) -> Result<()>;
}

/// Lifecycle state of a [`ResourceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ManagerState {
    /// No control loop is running.
    Stopped,
    /// The loop is sizing the pool.
    Running,
    /// The loop is releasing everything before stopping.
    Draining,
}

/// Point-in-time view of what the manager has observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManagerSnapshot {
    /// Resources allocated, as last reported.
    pub allocated: u32,
    /// Idle resources, as last reported.
    pub idle: u32,
    /// Lowest idle count reported in the current sample window.
    pub min_idle: Option<u32>,
    /// Lifecycle state.
    pub state: ManagerState,
}

#[derive(Debug)]
struct Observed {
    allocated: u32,
    idle: u32,
    min_idle: Option<u32>,
    state: ManagerState,
}

struct ManagerShared {
    config: ResourceManagerConfig,
    observed: Mutex<Observed>,
    cvar: Condvar,
    hook: Option<EventHook>,
}

/// Cloneable handle to a resource manager.
#[derive(Clone)]
pub struct ResourceManager {
    shared: Arc<ManagerShared>,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("config", &self.shared.config)
            .field("observed", &*self.shared.observed.lock())
            .field("hook", &self.shared.hook.is_some())
            .finish()
    }
}

impl ResourceManager {
    /// Creates a stopped manager.
    pub fn new(config: ResourceManagerConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Creates a stopped manager that reports to `hook`.
    pub fn with_event_hook(config: ResourceManagerConfig, hook: EventHook) -> Result<Self> {
        Self::build(config, Some(hook))
    }

    fn build(config: ResourceManagerConfig, hook: Option<EventHook>) -> Result<Self> {
        let config = config.normalized()?;
        Ok(Self {
            shared: Arc::new(ManagerShared {
                config,
                observed: Mutex::new(Observed {
                    allocated: 0,
                    idle: 0,
                    min_idle: None,
                    state: ManagerState::Stopped,
                }),
                cvar: Condvar::new(),
                hook,
            }),
        })
    }

    /// Returns the normalised configuration.
    #[must_use]
    pub fn config(&self) -> &ResourceManagerConfig {
        &self.shared.config
    }

    /// Records the pool's current counts.
    ///
    /// Also folds `idle` into the running minimum for the sample window.
    pub fn update(&self, allocated: u32, idle: u32) {
        let mut observed = self.shared.observed.lock();
        observed.allocated = allocated;
        observed.idle = idle;
        observed.min_idle = Some(observed.min_idle.map_or(idle, |min| min.min(idle)));
    }

    /// Returns the manager's current observations.
    #[must_use]
    pub fn snapshot(&self) -> ManagerSnapshot {
        let observed = self.shared.observed.lock();
        ManagerSnapshot {
            allocated: observed.allocated,
            idle: observed.idle,
            min_idle: observed.min_idle,
            state: observed.state,
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.shared.observed.lock().state
    }

    /// Arms a control loop against `pool` without spawning a thread.
    ///
    /// Moves the manager to `Running`. The caller drives the loop with
    /// [`ControlLoop::tick`] or [`ControlLoop::run`]. Fails with
    /// `IllegalState` unless the manager is stopped.
    pub fn control_loop(&self, pool: Arc<dyn ResourcePool>) -> Result<ControlLoop> {
        {
            let mut observed = self.shared.observed.lock();
            if observed.state != ManagerState::Stopped {
                return Err(Error::illegal_state(format!(
                    "resource manager already {:?}",
                    observed.state
                )));
            }
            observed.state = ManagerState::Running;
            observed.min_idle = None;
        }
        self.announce(ManagerState::Stopped, ManagerState::Running);
        Ok(ControlLoop::new(self.clone(), pool))
    }

    /// Spawns the control loop on a dedicated thread.
    pub fn start(&self, pool: Arc<dyn ResourcePool>) -> Result<JoinHandle<()>> {
        let control = self.control_loop(pool)?;
        let name = format!("{}-manager", self.shared.config.thread_name_prefix);
        thread::Builder::new()
            .name(name)
            .spawn(move || control.run())
            .map_err(|err| {
                self.set_state(ManagerState::Running, ManagerState::Stopped);
                Error::spawn_failed(err)
            })
    }

    /// Asks a running manager to drain and stop.
    ///
    /// Idempotent: a draining or stopped manager is left alone.
    pub fn stop(&self) {
        if self.set_state(ManagerState::Running, ManagerState::Draining) {
            self.shared.cvar.notify_all();
        }
    }

    /// Blocks until the manager is stopped or `timeout` elapses.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut observed = self.shared.observed.lock();
        while observed.state != ManagerState::Stopped {
            let remaining = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            if remaining.is_zero() {
                return false;
            }
            self.shared.cvar.wait_for(&mut observed, remaining);
        }
        true
    }

    /// Moves `from` to `to` if the manager is in `from`. Returns whether it moved.
    pub(crate) fn set_state(&self, from: ManagerState, to: ManagerState) -> bool {
        {
            let mut observed = self.shared.observed.lock();
            if observed.state != from {
                return false;
            }
            observed.state = to;
        }
        if to == ManagerState::Stopped {
            self.shared.cvar.notify_all();
        }
        self.announce(from, to);
        true
    }

    /// Sleeps one tick, waking early if the state leaves `current`.
    pub(crate) fn sleep_tick(&self, current: ManagerState) {
        let mut observed = self.shared.observed.lock();
        if observed.state == current {
            self.shared.cvar.wait_for(&mut observed, self.shared.config.tick);
        }
    }

    /// Takes the running window minimum and restarts the window at the current idle count.
    pub(crate) fn take_window_min(&self) -> u32 {
        let mut observed = self.shared.observed.lock();
        let local = observed.min_idle.unwrap_or(observed.idle);
        observed.min_idle = Some(observed.idle);
        local
    }

    pub(crate) fn emit(&self, event: &PoolEvent) {
        emit(self.shared.hook.as_ref(), event);
    }

    fn announce(&self, from: ManagerState, to: ManagerState) {
        tracing::info!(?from, ?to, "resource manager state change");
        self.emit(&PoolEvent::StateChanged { from, to });
    }
}
