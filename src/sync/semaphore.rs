//! Counting semaphore with interchangeable permits.
//!
//! Permits are plain counts: they are not tied to the context that took
//! them, so any context may release. Waiters are not ordered.
//!
//! # Example
//!
//! ```ignore
//! use rightsize::{Cx, sync::CountingSemaphore};
//!
//! let sem = CountingSemaphore::new(2)?;
//! let cx = Cx::new();
//! sem.acquire(&cx)?;
//! assert_eq!(sem.available_permits(), 1);
//! sem.release();
//! ```

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cx::cx::{timeout_from_millis, WaitBudget};
use crate::cx::Cx;
use crate::error::{Error, Result};

const PRIMITIVE: &str = "semaphore";

/// A counting semaphore.
#[derive(Debug)]
pub struct CountingSemaphore {
    permits: Mutex<i64>,
    cvar: Condvar,
}

impl CountingSemaphore {
    /// Creates a semaphore holding `permits` permits.
    ///
    /// Negative counts are rejected with `InvalidArgument`.
    pub fn new(permits: i64) -> Result<Self> {
        if permits < 0 {
            return Err(Error::invalid_argument(format!(
                "{PRIMITIVE}: negative permit count {permits}"
            )));
        }
        Ok(Self {
            permits: Mutex::new(permits),
            cvar: Condvar::new(),
        })
    }

    /// Creates a semaphore from a count that cannot be negative.
    #[must_use]
    pub fn with_permits(permits: u32) -> Self {
        Self {
            permits: Mutex::new(i64::from(permits)),
            cvar: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub fn acquire(&self, cx: &Cx) -> Result<()> {
        self.acquire_within(cx, WaitBudget::unbounded()).map(|_| ())
    }

    /// Waits at most `timeout` for a permit.
    #[must_use]
    pub fn try_acquire_for(&self, cx: &Cx, timeout: Duration) -> bool {
        matches!(self.acquire_within(cx, WaitBudget::within(timeout)), Ok(true))
    }

    /// Waits at most `timeout_ms` milliseconds for a permit.
    pub fn try_acquire_timed(&self, cx: &Cx, timeout_ms: i64) -> Result<bool> {
        let timeout = timeout_from_millis(PRIMITIVE, timeout_ms)?;
        Ok(self.try_acquire_for(cx, timeout))
    }

    /// Consumes a permit if one is available right now.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        take_permit(&mut permits)
    }

    /// Returns a permit and wakes one waiter.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        let was_empty = *permits == 0;
        *permits += 1;
        drop(permits);
        if was_empty {
            tracing::trace!("semaphore refilled");
        }
        // A waiter whose wait is cancelled after a notify drops the wakeup,
        // so every release signals rather than only the 0 -> 1 edge.
        self.cvar.notify_one();
    }

    /// Returns the number of permits currently available.
    #[must_use]
    pub fn available_permits(&self) -> i64 {
        *self.permits.lock()
    }

    fn acquire_within(&self, cx: &Cx, budget: WaitBudget) -> Result<bool> {
        let mut permits = self.permits.lock();
        loop {
            if take_permit(&mut permits) {
                return Ok(true);
            }
            cx.checkpoint(PRIMITIVE)?;
            let Some(slice) = budget.next_slice() else {
                return Ok(false);
            };
            self.cvar.wait_for(&mut permits, slice);
        }
    }
}

fn take_permit(permits: &mut i64) -> bool {
    if *permits > 0 {
        *permits -= 1;
        true
    } else {
        false
    }
}
