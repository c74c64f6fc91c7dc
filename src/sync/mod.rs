//! Blocking synchronization primitives keyed by caller context.
//!
//! Every blocking operation takes a [`Cx`](crate::Cx). Ownership and
//! reentrancy are tracked by the context's identity, and waits give up
//! cooperatively when the context is cancelled.
//!
//! # Primitives
//!
//! - [`ExclusiveLock`]: reentrant mutual exclusion
//! - [`CountingSemaphore`]: interchangeable permits
//! - [`Barrier`]: one-shot rendezvous with a leader
//! - [`FairRwLock`]: arrival-ordered readers and writers
//! - [`WorkBroker`]: blocking FIFO hand-off built from the above
//!
//! # Waiting
//!
//! Waits park on a condition variable in short slices and re-check both
//! the primitive's predicate and the caller's cancellation flag on every
//! wakeup, spurious or not.
//!
//! - Untimed waits return `Err(InterruptedWait)` when cancelled.
//! - Timed waits report cancellation the same way as a timeout: `false`.
//! - A wait that gives up never leaves the primitive held.

mod barrier;
mod broker;
mod mutex;
mod rwlock;
mod semaphore;

pub use barrier::{Barrier, BarrierWaitResult};
pub use broker::WorkBroker;
pub use mutex::{ExclusiveGuard, ExclusiveLock};
pub use rwlock::{FairRwLock, RwMode};
pub use semaphore::CountingSemaphore;
