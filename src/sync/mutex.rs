//! Reentrant exclusive lock keyed by caller context.
//!
//! One context owns the lock at a time. The owner may acquire it again
//! without blocking; each acquisition bumps a nest count and the lock opens
//! only when the owner has released as many times as it acquired.
//!
//! Waiters are not ordered: whichever blocked context wins the race after a
//! release becomes the next owner.
//!
//! # Example
//!
//! ```ignore
//! use rightsize::{Cx, sync::ExclusiveLock};
//!
//! let lock = ExclusiveLock::new();
//! let cx = Cx::new();
//! lock.acquire(&cx)?;
//! lock.acquire(&cx)?; // nested
//! lock.release(&cx)?;
//! lock.release(&cx)?; // now open
//! ```

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cx::cx::{timeout_from_millis, WaitBudget};
use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::types::ContextId;

const PRIMITIVE: &str = "exclusive lock";

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ContextId>,
    depth: u32,
}

impl LockState {
    fn attempt(&mut self, id: ContextId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(id);
                self.depth = 1;
                true
            }
            Some(owner) if owner == id => {
                self.depth += 1;
                true
            }
            Some(_) => false,
        }
    }
}

/// A reentrant mutual-exclusion lock.
#[derive(Debug, Default)]
pub struct ExclusiveLock {
    state: Mutex<LockState>,
    cvar: Condvar,
}

impl ExclusiveLock {
    /// Creates an open lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a lock already owned by `cx` with nest count `depth`.
    ///
    /// A depth of zero yields an open lock. Negative depths are rejected.
    pub fn held_by(cx: &Cx, depth: i64) -> Result<Self> {
        let depth = u32::try_from(depth).map_err(|_| {
            Error::invalid_argument(format!("{PRIMITIVE}: invalid initial nest count {depth}"))
        })?;
        let owner = (depth > 0).then(|| cx.id());
        Ok(Self {
            state: Mutex::new(LockState { owner, depth }),
            cvar: Condvar::new(),
        })
    }

    /// Blocks until `cx` owns the lock.
    ///
    /// Returns `Err(InterruptedWait)` if `cx` is cancelled while waiting; the
    /// lock is not held in that case.
    pub fn acquire(&self, cx: &Cx) -> Result<()> {
        self.acquire_within(cx, WaitBudget::unbounded()).map(|_| ())
    }

    /// Waits at most `timeout` for ownership.
    ///
    /// Returns false on timeout or cancellation.
    #[must_use]
    pub fn try_acquire_for(&self, cx: &Cx, timeout: Duration) -> bool {
        matches!(self.acquire_within(cx, WaitBudget::within(timeout)), Ok(true))
    }

    /// Waits at most `timeout_ms` milliseconds for ownership.
    ///
    /// Negative timeouts are rejected with `InvalidArgument`.
    pub fn try_acquire_timed(&self, cx: &Cx, timeout_ms: i64) -> Result<bool> {
        let timeout = timeout_from_millis(PRIMITIVE, timeout_ms)?;
        Ok(self.try_acquire_for(cx, timeout))
    }

    /// Attempts to take ownership without blocking.
    #[must_use]
    pub fn try_acquire(&self, cx: &Cx) -> bool {
        self.state.lock().attempt(cx.id())
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    pub fn lock<'a>(&'a self, cx: &Cx) -> Result<ExclusiveGuard<'a>> {
        self.acquire(cx)?;
        Ok(ExclusiveGuard {
            lock: self,
            cx: cx.clone(),
        })
    }

    /// Releases one level of ownership held by `cx`.
    ///
    /// When the nest count reaches zero the lock opens and one waiter is
    /// woken. Releasing a lock `cx` does not own is an `IllegalState` error.
    pub fn release(&self, cx: &Cx) -> Result<()> {
        let mut state = self.state.lock();
        if state.owner != Some(cx.id()) {
            return Err(Error::illegal_state(format!(
                "{PRIMITIVE}: lock not held by {}",
                cx.id()
            )));
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            tracing::trace!(ctx = %cx.id(), "exclusive lock opened");
            self.cvar.notify_one();
        }
        Ok(())
    }

    /// Returns the current owner, if any.
    #[must_use]
    pub fn owner(&self) -> Option<ContextId> {
        self.state.lock().owner
    }

    /// Returns true if `cx` currently owns the lock.
    #[must_use]
    pub fn is_owner(&self, cx: &Cx) -> bool {
        self.state.lock().owner == Some(cx.id())
    }

    /// Returns the owner's current nest count (zero when open).
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.state.lock().depth
    }

    fn acquire_within(&self, cx: &Cx, budget: WaitBudget) -> Result<bool> {
        let id = cx.id();
        let mut state = self.state.lock();
        loop {
            if state.attempt(id) {
                tracing::trace!(ctx = %id, depth = state.depth, "exclusive lock acquired");
                return Ok(true);
            }
            cx.checkpoint(PRIMITIVE)?;
            let Some(slice) = budget.next_slice() else {
                return Ok(false);
            };
            self.cvar.wait_for(&mut state, slice);
        }
    }
}

/// Guard returned by [`ExclusiveLock::lock`].
#[must_use = "guard will be immediately released if not held"]
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    lock: &'a ExclusiveLock,
    cx: Cx,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        // The guard's context is the owner by construction.
        let _ = self.lock.release(&self.cx);
    }
}
