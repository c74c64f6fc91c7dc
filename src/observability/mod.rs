//! Observability for the worker pool and its manager.
//!
//! Two layers, neither of which writes to stdout or stderr:
//!
//! - **Logging** goes through `tracing` everywhere in the crate.
//! - **Events and counters** are exposed here for callers that want to
//!   react programmatically: subscribe an [`EventHook`] to receive
//!   [`PoolEvent`]s, or read [`PoolMetrics`] totals.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rightsize::observability::{EventHook, PoolEvent};
//!
//! let hook: EventHook = Arc::new(|event: &PoolEvent| {
//!     tracing::info!(%event, "pool event");
//! });
//! ```

pub mod event;
pub mod metrics;

pub(crate) use event::emit;
pub use event::{EventHook, PoolEvent};
pub use metrics::{Counter, MetricsSnapshot, PoolMetrics};
