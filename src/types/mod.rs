//! Core types shared by the primitives, the manager and the pool.

pub mod id;

pub use id::ContextId;
