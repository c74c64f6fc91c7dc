//! Blocking FIFO hand-off between producers and pool workers.
//!
//! A [`WorkBroker`] pairs a queue with a [`CountingSemaphore`] whose permits
//! mirror the queued items, so `remove` blocks exactly while the queue is
//! empty. A bounded broker carries a second semaphore of free slots and
//! `insert` blocks while the queue is full.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::sync::CountingSemaphore;

/// A blocking work queue.
#[derive(Debug)]
pub struct WorkBroker<T> {
    queue: Mutex<VecDeque<T>>,
    items: CountingSemaphore,
    slots: Option<CountingSemaphore>,
}

impl<T> WorkBroker<T> {
    /// Creates an unbounded broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            items: CountingSemaphore::with_permits(0),
            slots: None,
        }
    }

    /// Creates a broker holding at most `capacity` items.
    pub fn bounded(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_argument("broker: capacity must be positive"));
        }
        let permits = i64::try_from(capacity)
            .map_err(|_| Error::invalid_argument(format!("broker: capacity {capacity} too large")))?;
        Ok(Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            items: CountingSemaphore::with_permits(0),
            slots: Some(CountingSemaphore::new(permits)?),
        })
    }

    /// Appends `item`, blocking while a bounded broker is full.
    pub fn insert(&self, cx: &Cx, item: T) -> Result<()> {
        if let Some(slots) = &self.slots {
            slots.acquire(cx)?;
        }
        self.queue.lock().push_back(item);
        self.items.release();
        Ok(())
    }

    /// Removes the oldest item, blocking while the broker is empty.
    pub fn remove(&self, cx: &Cx) -> Result<T> {
        loop {
            self.items.acquire(cx)?;
            if let Some(item) = self.pop() {
                return Ok(item);
            }
        }
    }

    /// Removes the oldest item, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or cancellation.
    pub fn remove_timeout(&self, cx: &Cx, timeout: Duration) -> Option<T> {
        if self.items.try_acquire_for(cx, timeout) {
            self.pop()
        } else {
            None
        }
    }

    /// Removes the oldest item if one is queued.
    pub fn try_remove(&self) -> Option<T> {
        if self.items.try_acquire() {
            self.pop()
        } else {
            None
        }
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    fn pop(&self) -> Option<T> {
        let item = self.queue.lock().pop_front();
        if item.is_some() {
            if let Some(slots) = &self.slots {
                slots.release();
            }
        }
        item
    }
}

impl<T> Default for WorkBroker<T> {
    fn default() -> Self {
        Self::new()
    }
}
