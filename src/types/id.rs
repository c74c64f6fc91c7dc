//! Identifier types for execution contexts.
//!
//! Lock ownership, read/write wait-list membership and pool worker membership
//! are all keyed by [`ContextId`] rather than by ambient thread identity. A
//! context is whatever the caller decides it is: a worker thread, a task, or a
//! test standing in for several logical callers on one OS thread.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT_ID: ContextId = ContextId::next();
}

/// Opaque identity of an execution context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a fresh, process-unique context id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id lazily bound to the calling OS thread.
    ///
    /// Repeated calls from the same thread return the same id.
    #[must_use]
    pub fn current_thread() -> Self {
        THREAD_CONTEXT_ID.with(|id| *id)
    }

    /// Creates a context id from a raw value (testing only).
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
