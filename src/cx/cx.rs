//! The caller context: identity plus cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::types::ContextId;

/// Granularity of cancellation checks inside blocking waits.
pub(crate) const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Caller context passed to every blocking operation.
///
/// Cloning a `Cx` yields a context with the same identity and the same
/// cancellation flag.
#[derive(Debug, Clone)]
pub struct Cx {
    id: ContextId,
    cancel: Arc<AtomicBool>,
}

impl Cx {
    /// Creates a context with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(ContextId::next())
    }

    /// Creates a context for an explicitly chosen identity.
    #[must_use]
    pub fn with_id(id: ContextId) -> Self {
        Self {
            id,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a context bound to the calling OS thread's identity.
    ///
    /// Each call gets its own cancellation flag.
    #[must_use]
    pub fn for_current_thread() -> Self {
        Self::with_id(ContextId::current_thread())
    }

    /// Creates a context for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::new()
    }

    /// Returns the context's identity.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns a handle that can cancel this context from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Sets or clears the cancellation flag.
    pub fn set_cancel_requested(&self, value: bool) {
        self.cancel.store(value, Ordering::Release);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Returns `Err(InterruptedWait)` if cancellation has been requested.
    pub fn checkpoint(&self, primitive: &str) -> Result<()> {
        if self.is_cancel_requested() {
            tracing::trace!(ctx = %self.id, primitive, "wait interrupted by cancellation");
            return Err(Error::interrupted(primitive));
        }
        Ok(())
    }
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-thread handle that requests cancellation of a [`Cx`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation. Waiting primitives notice within one wait slice.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Bounded-wait bookkeeping shared by the primitives.
///
/// Converts an optional deadline into the next wait slice, so untimed and
/// timed waits share one retry loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitBudget {
    deadline: Option<Instant>,
}

impl WaitBudget {
    pub(crate) const fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub(crate) fn within(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Returns the next slice to wait, or `None` once the deadline has passed.
    pub(crate) fn next_slice(&self) -> Option<Duration> {
        match self.deadline {
            None => Some(WAIT_SLICE),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(WAIT_SLICE))
                }
            }
        }
    }
}

/// Converts a millisecond timeout into a `Duration`, rejecting negatives.
pub(crate) fn timeout_from_millis(primitive: &str, millis: i64) -> Result<Duration> {
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| Error::negative_timeout(primitive, millis))
}
