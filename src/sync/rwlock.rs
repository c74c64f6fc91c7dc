//! Arrival-ordered read/write lock.
//!
//! Every requester gets one node in an arrival-ordered wait list. A reader
//! is granted once no writer node precedes it; a writer is granted only at
//! the head of the list. Readers arriving after a pending writer queue
//! behind it, so a steady stream of readers cannot starve writers.
//!
//! Holds are reentrant for the same requester in the same mode. A writer
//! may also take read holds on its own node; they count as further holds of
//! that node and the lock stays exclusive until every hold is released.
//! Asking for a write hold while owning a read node is rejected as an
//! upgrade, which would deadlock against the other readers.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cx::cx::WaitBudget;
use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::types::ContextId;

const PRIMITIVE: &str = "rwlock";

/// Access mode of a wait-list node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

#[derive(Debug)]
struct Node {
    requester: ContextId,
    mode: RwMode,
    holds: u32,
}

#[derive(Debug, Default)]
struct WaitList {
    nodes: Vec<Node>,
}

impl WaitList {
    fn position(&self, id: ContextId) -> Option<usize> {
        self.nodes.iter().position(|node| node.requester == id)
    }

    fn first_writer(&self) -> Option<usize> {
        self.nodes.iter().position(|node| node.mode == RwMode::Write)
    }

    fn eligible(&self, idx: usize) -> bool {
        match self.nodes[idx].mode {
            RwMode::Write => idx == 0,
            RwMode::Read => self.first_writer().map_or(true, |writer| idx < writer),
        }
    }

    /// Returns the requester's node index, enqueueing a fresh node if needed.
    fn enqueue(&mut self, id: ContextId, mode: RwMode) -> usize {
        if let Some(idx) = self.position(id) {
            return idx;
        }
        self.nodes.push(Node {
            requester: id,
            mode,
            holds: 0,
        });
        self.nodes.len() - 1
    }

    /// Drops a node that never obtained a hold. Returns whether one was removed.
    fn abandon(&mut self, id: ContextId) -> bool {
        match self.position(id) {
            Some(idx) if self.nodes[idx].holds == 0 => {
                self.nodes.remove(idx);
                true
            }
            _ => false,
        }
    }
}

/// A fair, reentrant read/write lock.
#[derive(Debug, Default)]
pub struct FairRwLock {
    list: Mutex<WaitList>,
    cvar: Condvar,
}

impl FairRwLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `cx` holds the lock for reading.
    pub fn lock_read(&self, cx: &Cx) -> Result<()> {
        self.lock_within(cx, RwMode::Read, WaitBudget::unbounded())
            .map(|_| ())
    }

    /// Blocks until `cx` holds the lock for writing.
    ///
    /// Fails with `IllegalState` if `cx` already has a read node.
    pub fn lock_write(&self, cx: &Cx) -> Result<()> {
        self.lock_within(cx, RwMode::Write, WaitBudget::unbounded())
            .map(|_| ())
    }

    /// Takes a read hold only if it can be granted immediately.
    pub fn try_lock_read(&self, cx: &Cx) -> Result<bool> {
        self.try_lock_for(cx, RwMode::Read, Duration::ZERO)
    }

    /// Takes a write hold only if it can be granted immediately.
    pub fn try_lock_write(&self, cx: &Cx) -> Result<bool> {
        self.try_lock_for(cx, RwMode::Write, Duration::ZERO)
    }

    /// Waits at most `timeout` for a read hold.
    pub fn try_lock_read_for(&self, cx: &Cx, timeout: Duration) -> Result<bool> {
        self.try_lock_for(cx, RwMode::Read, timeout)
    }

    /// Waits at most `timeout` for a write hold.
    pub fn try_lock_write_for(&self, cx: &Cx, timeout: Duration) -> Result<bool> {
        self.try_lock_for(cx, RwMode::Write, timeout)
    }

    /// Releases one hold owned by `cx`.
    ///
    /// When the node's last hold goes away the node leaves the list and all
    /// waiters re-check their eligibility.
    pub fn unlock(&self, cx: &Cx) -> Result<()> {
        let id = cx.id();
        let mut list = self.list.lock();
        let idx = list
            .position(id)
            .filter(|&idx| list.nodes[idx].holds > 0)
            .ok_or_else(|| Error::illegal_state(format!("{PRIMITIVE}: unlock without a held node")))?;
        if list.first_writer().is_some_and(|writer| writer < idx) {
            return Err(Error::illegal_state(format!(
                "{PRIMITIVE}: node held behind a pending writer"
            )));
        }

        let node = &mut list.nodes[idx];
        node.holds -= 1;
        if node.holds == 0 {
            let mode = node.mode;
            list.nodes.remove(idx);
            drop(list);
            tracing::trace!(ctx = %id, ?mode, "rwlock node released");
            self.cvar.notify_all();
        }
        Ok(())
    }

    /// Returns how many distinct contexts hold the lock for reading.
    #[must_use]
    pub fn active_readers(&self) -> usize {
        let list = self.list.lock();
        list.nodes
            .iter()
            .filter(|node| node.mode == RwMode::Read && node.holds > 0)
            .count()
    }

    /// Returns true if a writer holds the lock.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        let list = self.list.lock();
        list.nodes
            .first()
            .is_some_and(|node| node.mode == RwMode::Write && node.holds > 0)
    }

    /// Returns the number of nodes in the wait list, holders included.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.list.lock().nodes.len()
    }

    fn try_lock_for(&self, cx: &Cx, mode: RwMode, timeout: Duration) -> Result<bool> {
        match self.lock_within(cx, mode, WaitBudget::within(timeout)) {
            Err(err) if err.is_interrupted() => Ok(false),
            other => other,
        }
    }

    fn lock_within(&self, cx: &Cx, mode: RwMode, budget: WaitBudget) -> Result<bool> {
        let id = cx.id();
        let mut list = self.list.lock();
        if let Some(idx) = list.position(id) {
            if list.nodes[idx].mode == RwMode::Read && mode == RwMode::Write {
                return Err(Error::illegal_state(format!(
                    "{PRIMITIVE}: lock upgrade not supported"
                )));
            }
        }

        loop {
            let idx = list.enqueue(id, mode);
            if list.eligible(idx) {
                list.nodes[idx].holds += 1;
                tracing::trace!(ctx = %id, ?mode, holds = list.nodes[idx].holds, "rwlock granted");
                return Ok(true);
            }
            let outcome = match cx.checkpoint(PRIMITIVE) {
                Err(err) => Err(err),
                Ok(()) => match budget.next_slice() {
                    Some(slice) => {
                        self.cvar.wait_for(&mut list, slice);
                        continue;
                    }
                    None => Ok(false),
                },
            };
            if list.abandon(id) {
                self.cvar.notify_all();
            }
            return outcome;
        }
    }
}
