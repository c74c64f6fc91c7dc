//! Structured pool events.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::manager::ManagerState;
use crate::types::ContextId;

/// Something the pool or its manager did that a subscriber may care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// `allocate` ran; `spawned` may fall short of `requested` if spawns failed.
    WorkersAllocated {
        /// Workers the manager asked for.
        requested: u32,
        /// Workers actually started.
        spawned: u32,
    },
    /// `release` marked workers for cooperative shutdown.
    ReleaseRequested {
        /// Workers marked.
        count: u32,
    },
    /// The liveness sweep found a worker that ended without deregistering.
    WorkerDied {
        /// The dead worker.
        worker: ContextId,
    },
    /// A worker deregistered and its thread finished.
    WorkerExited {
        /// The departed worker.
        worker: ContextId,
    },
    /// The manager recorded an idle-level sample.
    IdleSampled {
        /// Lowest idle count seen over the sample window.
        level: u32,
    },
    /// The manager moved between lifecycle states.
    StateChanged {
        /// Previous state.
        from: ManagerState,
        /// New state.
        to: ManagerState,
    },
    /// A pool callback failed or panicked; the control loop carried on.
    CallbackFailed {
        /// Callback name: `allocate`, `release` or `prune`.
        callback: &'static str,
        /// Rendered failure.
        error: String,
    },
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkersAllocated { requested, spawned } => {
                write!(f, "allocated {spawned}/{requested} workers")
            }
            Self::ReleaseRequested { count } => write!(f, "release of {count} workers requested"),
            Self::WorkerDied { worker } => write!(f, "worker {worker} died"),
            Self::WorkerExited { worker } => write!(f, "worker {worker} exited"),
            Self::IdleSampled { level } => write!(f, "idle level {level} sampled"),
            Self::StateChanged { from, to } => write!(f, "manager {from:?} -> {to:?}"),
            Self::CallbackFailed { callback, error } => write!(f, "{callback} failed: {error}"),
        }
    }
}

/// Subscriber callback for [`PoolEvent`]s.
///
/// Hooks run synchronously on the thread that produced the event, never
/// while a pool or manager lock is held.
pub type EventHook = Arc<dyn Fn(&PoolEvent) + Send + Sync>;

/// Delivers `event` to `hook`, if one is installed.
pub(crate) fn emit(hook: Option<&EventHook>, event: &PoolEvent) {
    if let Some(hook) = hook {
        hook(event);
    }
}
