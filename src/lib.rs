//! Rightsize: blocking synchronization primitives and a self-sizing worker pool.
//!
//! # Overview
//!
//! Rightsize provides four thread-blocking primitives and a worker pool that
//! grows and shrinks itself from observed idleness. Every blocking call takes
//! a caller context ([`Cx`]) that carries the caller's identity and a
//! cooperative cancellation flag; ownership is keyed by that identity, never
//! by ambient thread state.
//!
//! # Core Guarantees
//!
//! - **Reentrant ownership**: an [`ExclusiveLock`](sync::ExclusiveLock) is
//!   released only after as many releases as acquisitions
//! - **FIFO fairness**: [`FairRwLock`](sync::FairRwLock) admits requesters in
//!   arrival order; readers never overtake a queued writer
//! - **Cancellable waits**: untimed waits fail with `InterruptedWait`, timed
//!   waits report "not acquired"
//! - **Bounded pool**: the [`ResourceManager`] keeps allocation within
//!   `[min, max]` and shrinks only on evidence of sustained surplus
//! - **Cooperative shrink**: workers are asked to stop, never interrupted
//!
//! # Module Structure
//!
//! - [`cx`]: Caller context and cancellation
//! - [`sync`]: Lock, semaphore, barrier, fair read/write lock, work broker
//! - [`manager`]: Resource manager and its control loop
//! - [`pool`]: Worker pool implementing the manager's callbacks
//! - [`config`]: Pool configuration from code, maps, environment and TOML
//! - [`observability`]: Pool events and counters
//! - [`error`]: Error types
//! - [`types`]: Identifiers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cx;
pub mod error;
pub mod manager;
pub mod observability;
pub mod pool;
pub mod sync;
pub mod types;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use config::{ConfigError, PoolConfig};
pub use cx::{CancelHandle, Cx};
pub use error::{Error, ErrorKind, Result};
pub use manager::{
    ControlLoop, ManagerSnapshot, ManagerState, ResourceManager, ResourceManagerConfig,
    ResourcePool, MAX_POOL_SIZE,
};
pub use observability::{EventHook, MetricsSnapshot, PoolEvent};
pub use pool::{PoolHandle, PoolStats, Worker, WorkerContext, WorkerFactory, WorkerPool};
pub use sync::{Barrier, CountingSemaphore, ExclusiveLock, FairRwLock, WorkBroker};
pub use types::ContextId;
