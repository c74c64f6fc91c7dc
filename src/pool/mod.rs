//! A self-sizing pool of worker threads.
//!
//! [`WorkerPool`] owns a set of worker threads and a [`ResourceManager`]
//! that sizes it. Workers report their transitions (register, idle, busy,
//! leave) through [`PoolHandle`]; the pool folds them into [`PoolStats`] and
//! forwards `(allocated, idle)` to the manager. The manager calls back
//! through the [`ResourcePool`] implementation on `PoolHandle` to spawn,
//! retire and sweep workers.
//!
//! # Locking
//!
//! All counters and membership sets live behind one mutex. Reports to the
//! manager are made while holding it, so the manager always sees counts in
//! the order they changed (lock order: pool, then manager). Threads are
//! spawned and joined outside the lock.
//!
//! # Retiring workers
//!
//! Shrinking is cooperative. `release(n)` lowers `allocated` at once and
//! leaves `n` stop signals that workers claim through `should_stop()`. No
//! worker is ever interrupted.
//!
//! # Example
//!
//! ```ignore
//! use rightsize::pool::{WorkerContext, WorkerPool};
//! use rightsize::PoolConfig;
//!
//! let pool = WorkerPool::builder(PoolConfig::new(2, 1, 8))
//!     .factory(|| |ctx: &WorkerContext| {
//!         ctx.register();
//!         while !ctx.should_stop() {
//!             ctx.check_in();
//!             std::thread::sleep(std::time::Duration::from_millis(10));
//!         }
//!         ctx.unregister();
//!     })
//!     .build()?;
//! pool.start()?;
//! // ...
//! pool.shutdown_and_wait(std::time::Duration::from_secs(5));
//! ```

mod stats;
mod worker;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

pub use stats::PoolStats;
pub use worker::{Worker, WorkerContext, WorkerFactory};

use crate::config::PoolConfig;
use crate::cx::{CancelHandle, Cx};
use crate::error::{panic_message, Error, Result};
use crate::manager::{ManagerState, ResourceManager, ResourceManagerConfig, ResourcePool};
use crate::observability::{emit, EventHook, MetricsSnapshot, PoolEvent, PoolMetrics};
use crate::types::ContextId;

/// How long dropping a running pool waits for it to drain.
const DROP_TIMEOUT: Duration = Duration::from_secs(5);

/// Polling interval while waiting for worker threads to finish.
const JOIN_POLL: Duration = Duration::from_millis(10);

struct WorkerRecord {
    /// `None` between reserving the id and the spawn returning.
    handle: Option<JoinHandle<()>>,
    cancel: CancelHandle,
    unregistered: bool,
    released: bool,
}

#[derive(Default)]
struct PoolState {
    counters: PoolStats,
    idle: HashSet<ContextId>,
    busy: HashSet<ContextId>,
    records: HashMap<ContextId, WorkerRecord>,
}

impl PoolState {
    fn report(&self, manager: &ResourceManager) {
        manager.update(self.counters.allocated, self.counters.idle);
    }

    fn is_member(&self, id: &ContextId) -> bool {
        self.idle.contains(id) || self.busy.contains(id)
    }

    /// Drops `id` from whichever membership set holds it. Returns whether it was a member.
    fn leave(&mut self, id: &ContextId) -> bool {
        if self.busy.remove(id) {
            self.counters.busy -= 1;
        } else if self.idle.remove(id) {
            self.counters.idle -= 1;
        } else {
            return false;
        }
        self.counters.registered -= 1;
        true
    }
}

struct PoolInner {
    config: PoolConfig,
    manager: ResourceManager,
    factory: RwLock<Option<Arc<dyn WorkerFactory>>>,
    state: Mutex<PoolState>,
    manager_thread: Mutex<Option<JoinHandle<()>>>,
    /// Set by `start`, cleared once a shutdown has reaped every thread.
    started: AtomicBool,
    metrics: PoolMetrics,
    hook: Option<EventHook>,
}

/// Cloneable handle to a pool.
///
/// Workers use it to report their transitions; the manager uses it as the
/// pool's [`ResourcePool`].
#[derive(Clone)]
pub struct PoolHandle {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("stats", &self.stats())
            .finish()
    }
}

/// A worker pool sized by a [`ResourceManager`].
///
/// Dropping a running pool shuts it down and waits a bounded time for its
/// workers to leave.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("min", &self.inner.config.min)
            .field("threshold", &self.inner.config.threshold)
            .field("max", &self.inner.config.max)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for [`WorkerPool`].
#[must_use = "builders do nothing until .build() is called"]
pub struct WorkerPoolBuilder {
    config: PoolConfig,
    factory: Option<Arc<dyn WorkerFactory>>,
    hook: Option<EventHook>,
}

impl fmt::Debug for WorkerPoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolBuilder")
            .field("config", &self.config)
            .field("factory", &self.factory.is_some())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl WorkerPoolBuilder {
    /// Sets the factory that produces each new worker.
    pub fn factory(mut self, factory: impl WorkerFactory) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Subscribes `hook` to pool and manager events.
    pub fn event_hook(mut self, hook: EventHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Builds the pool. The manager is created but not started.
    pub fn build(self) -> Result<WorkerPool> {
        let manager_config = ResourceManagerConfig::from(&self.config);
        let manager = match &self.hook {
            Some(hook) => ResourceManager::with_event_hook(manager_config, Arc::clone(hook))?,
            None => ResourceManager::new(manager_config)?,
        };
        let mut config = self.config;
        config.max = manager.config().max;
        Ok(WorkerPool {
            inner: Arc::new(PoolInner {
                config,
                manager,
                factory: RwLock::new(self.factory),
                state: Mutex::new(PoolState::default()),
                manager_thread: Mutex::new(None),
                started: AtomicBool::new(false),
                metrics: PoolMetrics::default(),
                hook: self.hook,
            }),
        })
    }
}

impl WorkerPool {
    /// Starts building a pool with `config`.
    pub fn builder(config: PoolConfig) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            config,
            factory: None,
            hook: None,
        }
    }

    /// Creates a pool with no factory and no event hook.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Installs or replaces the worker factory.
    ///
    /// Workers already running are unaffected.
    pub fn set_factory(&self, factory: impl WorkerFactory) {
        *self.inner.factory.write() = Some(Arc::new(factory));
    }

    /// Starts the manager's control loop.
    ///
    /// Fails with `IllegalState` if no factory is installed. Starting a
    /// running or draining pool is a no-op. A pool whose manager has
    /// stopped can be started again.
    pub fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.inner.factory.read().is_none() {
            return Err(Error::illegal_state("worker pool: missing worker factory"));
        }
        let mut manager_thread = self.inner.manager_thread.lock();
        if let Some(previous) = manager_thread.take() {
            if previous.join().is_err() {
                tracing::error!("control loop thread panicked");
            }
        }
        prune_on_inner(&self.inner);
        *manager_thread = Some(self.inner.manager.start(Arc::new(self.handle()))?);
        drop(manager_thread);
        self.inner.started.store(true, Ordering::Release);
        tracing::info!(
            min = self.inner.config.min,
            threshold = self.inner.config.threshold,
            max = self.inner.config.max,
            "worker pool started"
        );
        Ok(())
    }

    /// Asks the manager to drain the pool. Returns immediately.
    pub fn shutdown(&self) {
        tracing::info!(stats = %self.stats(), "worker pool shutting down");
        self.inner.manager.stop();
    }

    /// Shuts down and waits for the manager and every worker thread to finish.
    ///
    /// Returns `true` if the pool drained within `timeout`.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();
        let deadline = Instant::now().checked_add(timeout);
        let remaining =
            || deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));

        if !self.inner.manager.wait_stopped(remaining()) {
            return false;
        }
        if let Some(thread) = self.inner.manager_thread.lock().take() {
            if thread.join().is_err() {
                tracing::error!("control loop thread panicked");
            }
        }

        loop {
            prune_on_inner(&self.inner);
            if self.inner.state.lock().records.is_empty() {
                break;
            }
            let left = remaining();
            if left.is_zero() {
                return false;
            }
            thread::sleep(JOIN_POLL.min(left));
        }

        self.inner.started.store(false, Ordering::Release);
        tracing::info!(stats = %self.stats(), "worker pool stopped");
        true
    }

    /// Returns a cloneable handle to this pool.
    #[must_use]
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the occupancy counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().counters
    }

    /// Returns lifetime totals.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Returns the manager sizing this pool.
    #[must_use]
    pub fn manager(&self) -> &ResourceManager {
        &self.inner.manager
    }

    /// Returns the pool configuration, with `max` normalised.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Returns true while the manager is running or draining.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.manager.state() != ManagerState::Stopped
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.inner.started.load(Ordering::Acquire) {
            return;
        }
        if !self.shutdown_and_wait(DROP_TIMEOUT) {
            tracing::warn!(stats = %self.stats(), "worker pool did not drain; cancelling workers");
            let state = self.inner.state.lock();
            for record in state.records.values() {
                record.cancel.cancel();
            }
        }
    }
}

impl PoolHandle {
    /// Adds `cx` to the busy set. Re-registering a member is a no-op.
    pub fn register(&self, cx: &Cx) {
        let id = cx.id();
        let mut state = self.inner.state.lock();
        if state.is_member(&id) {
            return;
        }
        state.busy.insert(id);
        state.counters.busy += 1;
        state.counters.registered += 1;
        tracing::debug!(worker = %id, registered = state.counters.registered, "worker registered");
    }

    /// Removes `cx` from the pool's membership.
    pub fn unregister(&self, cx: &Cx) {
        let id = cx.id();
        let mut state = self.inner.state.lock();
        if let Some(record) = state.records.get_mut(&id) {
            record.unregistered = true;
        }
        if state.leave(&id) {
            state.report(&self.inner.manager);
            tracing::debug!(worker = %id, registered = state.counters.registered, "worker unregistered");
        }
    }

    /// Moves `cx` to the idle set and reports the new counts.
    ///
    /// An unknown context is registered on the way in.
    pub fn check_in(&self, cx: &Cx) {
        let id = cx.id();
        let mut state = self.inner.state.lock();
        if state.busy.remove(&id) {
            state.counters.busy -= 1;
        } else if !state.idle.contains(&id) {
            state.counters.registered += 1;
        }
        if state.idle.insert(id) {
            state.counters.idle += 1;
        }
        state.report(&self.inner.manager);
    }

    /// Moves `cx` to the busy set and reports the new counts.
    ///
    /// An unknown context is registered on the way in.
    pub fn check_out(&self, cx: &Cx) {
        let id = cx.id();
        let mut state = self.inner.state.lock();
        if state.idle.remove(&id) {
            state.counters.idle -= 1;
        } else if !state.busy.contains(&id) {
            state.counters.registered += 1;
        }
        if state.busy.insert(id) {
            state.counters.busy += 1;
        }
        state.report(&self.inner.manager);
    }

    /// Claims one pending stop signal for `cx`.
    ///
    /// Only workers this pool spawned can claim a signal; a context that
    /// joined through `check_in` or `check_out` always gets false. Returns
    /// true at most as many times, in total, as workers were released.
    #[must_use]
    pub fn should_stop(&self, cx: &Cx) -> bool {
        let id = cx.id();
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.counters.pending_release == 0 {
            return false;
        }
        let Some(record) = state.records.get_mut(&id) else {
            return false;
        };
        if record.released {
            return false;
        }
        record.released = true;
        state.counters.pending_release -= 1;
        tracing::debug!(worker = %id, pending = state.counters.pending_release, "worker told to stop");
        true
    }

    /// Returns the occupancy counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().counters
    }
}

impl ResourcePool for PoolHandle {
    fn allocate(&self, n: u32) -> Result<()> {
        allocate_on_inner(&self.inner, n)
    }

    fn release(&self, n: u32) -> Result<()> {
        let count = {
            let mut state = self.inner.state.lock();
            let n = n.min(state.counters.allocated);
            state.counters.pending_release += n;
            state.counters.allocated -= n;
            state.report(&self.inner.manager);
            n
        };
        if count > 0 {
            self.inner.metrics.workers_released.add(u64::from(count));
            tracing::info!(count, "workers released");
            emit(self.inner.hook.as_ref(), &PoolEvent::ReleaseRequested { count });
        }
        Ok(())
    }

    fn prune(&self) -> Result<()> {
        prune_on_inner(&self.inner);
        Ok(())
    }
}

/// Spawns `n` workers from the installed factory.
fn allocate_on_inner(inner: &Arc<PoolInner>, n: u32) -> Result<()> {
    let factory = inner
        .factory
        .read()
        .clone()
        .ok_or_else(|| Error::illegal_state("worker pool: missing worker factory"))?;

    let mut spawned = 0;
    let mut failure = None;
    for _ in 0..n {
        if let Err(err) = spawn_worker_on_inner(inner, factory.as_ref()) {
            inner.metrics.spawn_failures.increment();
            tracing::warn!(error = %err, "worker spawn failed");
            failure = Some(err);
            break;
        }
        spawned += 1;
    }

    tracing::info!(requested = n, spawned, "workers allocated");
    emit(
        inner.hook.as_ref(),
        &PoolEvent::WorkersAllocated {
            requested: n,
            spawned,
        },
    );
    failure.map_or(Ok(()), Err)
}

fn spawn_worker_on_inner(inner: &Arc<PoolInner>, factory: &dyn WorkerFactory) -> Result<()> {
    let mut worker = factory.create();
    let cx = Cx::new();
    let id = cx.id();
    let ctx = WorkerContext::new(
        PoolHandle {
            inner: Arc::clone(inner),
        },
        cx.clone(),
    );

    inner.state.lock().records.insert(
        id,
        WorkerRecord {
            handle: None,
            cancel: cx.cancel_handle(),
            unregistered: false,
            released: false,
        },
    );

    let name = format!("{}-worker-{}", inner.config.thread_name_prefix, id.as_u64());
    let spawned = thread::Builder::new().name(name).spawn(move || {
        tracing::trace!(worker = %ctx.id(), "worker thread started");
        worker.run(&ctx);
        tracing::trace!(worker = %ctx.id(), "worker thread finished");
    });

    let mut state = inner.state.lock();
    match spawned {
        Ok(handle) => {
            if let Some(record) = state.records.get_mut(&id) {
                record.handle = Some(handle);
            }
            state.counters.allocated += 1;
            state.report(&inner.manager);
            inner.metrics.workers_spawned.increment();
            Ok(())
        }
        Err(err) => {
            state.records.remove(&id);
            Err(Error::spawn_failed(err))
        }
    }
}

/// Sweeps out finished worker threads and corrects the counters for any
/// that ended without unregistering.
fn prune_on_inner(inner: &Arc<PoolInner>) {
    let finished: Vec<(ContextId, JoinHandle<()>, bool)> = {
        let mut state = inner.state.lock();
        let done: Vec<ContextId> = state
            .records
            .iter()
            .filter(|(_, record)| record.handle.as_ref().is_some_and(JoinHandle::is_finished))
            .map(|(id, _)| *id)
            .collect();

        let mut finished = Vec::with_capacity(done.len());
        for id in done {
            let Some(record) = state.records.remove(&id) else {
                continue;
            };
            let died = !record.unregistered;
            if died {
                state.leave(&id);
            }
            if !record.released {
                state.counters.allocated = state.counters.allocated.saturating_sub(1);
            }
            if let Some(handle) = record.handle {
                finished.push((id, handle, died));
            }
        }
        state.report(&inner.manager);
        finished
    };

    for (id, handle, died) in finished {
        let outcome = handle.join();
        if died {
            let detail = match &outcome {
                Ok(()) => "returned without unregistering".to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            let err = Error::dead_worker(id, &detail);
            inner.metrics.workers_died.increment();
            tracing::warn!(worker = %id, error = %err, "dead worker pruned");
            emit(inner.hook.as_ref(), &PoolEvent::WorkerDied { worker: id });
        } else {
            inner.metrics.workers_exited.increment();
            tracing::debug!(worker = %id, "worker exited");
            emit(inner.hook.as_ref(), &PoolEvent::WorkerExited { worker: id });
        }
    }
}
