//! Caller context for blocking operations.
//!
//! The [`Cx`] type is the token every blocking primitive takes. It answers
//! two questions for the primitive:
//!
//! - **Who is asking?** Ownership and reentrancy are keyed by the context's
//!   [`ContextId`](crate::types::ContextId), never by ambient thread identity.
//! - **Should the wait give up?** Cancellation is cooperative: a
//!   [`CancelHandle`] flips a flag that waiting primitives check at every
//!   retry.
//!
//! ```ignore
//! use rightsize::{Cx, sync::ExclusiveLock};
//!
//! let lock = ExclusiveLock::new();
//! let cx = Cx::for_current_thread();
//! lock.acquire(&cx)?;
//! lock.release(&cx)?;
//! ```

pub mod cx;

pub use cx::{CancelHandle, Cx};
