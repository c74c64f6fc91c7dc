//! The worker contract.
//!
//! A worker is started on its own thread with a [`WorkerContext`] and is
//! expected to follow this protocol:
//!
//! 1. `register()` on start.
//! 2. `check_in()` when idle and waiting for work.
//! 3. `check_out()` before doing real work.
//! 4. Poll `should_stop()` regularly; when it returns true, call
//!    `unregister()` and return.
//!
//! A worker that ends any other way (returning early, panicking) is treated
//! as dead and swept out by the pool's next `prune`.
//!
//! ```ignore
//! let factory = || |ctx: &WorkerContext| {
//!     ctx.register();
//!     loop {
//!         ctx.check_in();
//!         if ctx.should_stop() {
//!             break;
//!         }
//!         if let Some(job) = broker.remove_timeout(ctx.cx(), Duration::from_millis(50)) {
//!             ctx.check_out();
//!             job.run();
//!         }
//!     }
//!     ctx.unregister();
//! };
//! ```

use super::PoolHandle;
use crate::cx::Cx;
use crate::types::ContextId;

/// Body of a pool worker.
pub trait Worker: Send + 'static {
    /// Runs the worker until it decides to stop.
    fn run(&mut self, ctx: &WorkerContext);
}

impl<F> Worker for F
where
    F: FnMut(&WorkerContext) + Send + 'static,
{
    fn run(&mut self, ctx: &WorkerContext) {
        self(ctx);
    }
}

/// Produces a fresh worker for every allocation.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Creates a worker in its initial, not-yet-started state.
    fn create(&self) -> Box<dyn Worker>;
}

impl<F, W> WorkerFactory for F
where
    F: Fn() -> W + Send + Sync + 'static,
    W: Worker,
{
    fn create(&self) -> Box<dyn Worker> {
        Box::new(self())
    }
}

/// What a worker is handed when it starts: its own context and the pool.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pool: PoolHandle,
    cx: Cx,
}

impl WorkerContext {
    pub(crate) fn new(pool: PoolHandle, cx: Cx) -> Self {
        Self { pool, cx }
    }

    /// Returns the worker's caller context, for blocking on primitives.
    #[must_use]
    pub fn cx(&self) -> &Cx {
        &self.cx
    }

    /// Returns the worker's identity.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.cx.id()
    }

    /// Returns the pool this worker belongs to.
    #[must_use]
    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    /// Joins the pool as a busy worker.
    pub fn register(&self) {
        self.pool.register(&self.cx);
    }

    /// Leaves the pool.
    pub fn unregister(&self) {
        self.pool.unregister(&self.cx);
    }

    /// Marks this worker idle.
    pub fn check_in(&self) {
        self.pool.check_in(&self.cx);
    }

    /// Marks this worker busy.
    pub fn check_out(&self) {
        self.pool.check_out(&self.cx);
    }

    /// Claims a pending stop signal. True means this worker should exit.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.pool.should_stop(&self.cx)
    }
}
