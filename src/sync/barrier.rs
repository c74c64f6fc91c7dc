//! One-shot rendezvous barrier.
//!
//! A barrier is created with a participant count. Each [`Barrier::arrive`]
//! counts down once and blocks until the count reaches zero; the arrival
//! that reaches zero wakes everyone and is reported as the leader.
//! [`Barrier::wait_only`] blocks without counting, for coordinators that
//! observe the rendezvous but do not take part in it.
//!
//! The barrier does not reset. Arrivals after it has tripped return at once.

use parking_lot::{Condvar, Mutex};

use crate::cx::cx::WaitBudget;
use crate::cx::Cx;
use crate::error::{Error, Result};

const PRIMITIVE: &str = "barrier";

/// Result of a barrier arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// Returns true for the arrival that tripped the barrier.
    #[must_use]
    pub const fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// A one-shot countdown barrier.
#[derive(Debug)]
pub struct Barrier {
    remaining: Mutex<u64>,
    cvar: Condvar,
}

impl Barrier {
    /// Creates a barrier that trips after `count` arrivals.
    ///
    /// A count of zero yields an already-tripped barrier.
    pub fn new(count: i64) -> Result<Self> {
        let remaining = u64::try_from(count).map_err(|_| {
            Error::invalid_argument(format!("{PRIMITIVE}: negative participant count {count}"))
        })?;
        Ok(Self {
            remaining: Mutex::new(remaining),
            cvar: Condvar::new(),
        })
    }

    /// Counts this arrival and blocks until every participant has arrived.
    ///
    /// If `cx` is cancelled before the barrier trips, the arrival is
    /// withdrawn and `Err(InterruptedWait)` is returned.
    pub fn arrive(&self, cx: &Cx) -> Result<BarrierWaitResult> {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            tracing::warn!(ctx = %cx.id(), "arrival at an already tripped barrier");
            return Ok(BarrierWaitResult { is_leader: false });
        }

        *remaining -= 1;
        if *remaining == 0 {
            drop(remaining);
            tracing::trace!(ctx = %cx.id(), "barrier tripped");
            self.cvar.notify_all();
            return Ok(BarrierWaitResult { is_leader: true });
        }

        let budget = WaitBudget::unbounded();
        loop {
            if let Err(err) = cx.checkpoint(PRIMITIVE) {
                *remaining += 1;
                return Err(err);
            }
            if let Some(slice) = budget.next_slice() {
                self.cvar.wait_for(&mut remaining, slice);
            }
            if *remaining == 0 {
                return Ok(BarrierWaitResult { is_leader: false });
            }
        }
    }

    /// Blocks until the barrier trips without counting as a participant.
    pub fn wait_only(&self, cx: &Cx) -> Result<()> {
        let budget = WaitBudget::unbounded();
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            cx.checkpoint(PRIMITIVE)?;
            if let Some(slice) = budget.next_slice() {
                self.cvar.wait_for(&mut remaining, slice);
            }
        }
        Ok(())
    }

    /// Returns how many arrivals are still outstanding.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        *self.remaining.lock()
    }

    /// Returns true once every participant has arrived.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.remaining() == 0
    }
}
