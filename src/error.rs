//! Error types and error handling strategy.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Protocol violations surface synchronously to the caller
//! - Interrupted waits are soft failures: the caller retries or gives up,
//!   they never abort the process
//! - The resource manager's control loop logs callback failures and keeps
//!   ticking; nothing it observes is propagated to its owner
//!
//! # Error Kinds
//!
//! - **InvalidArgument**: negative counts or timeouts
//! - **IllegalState**: release without ownership, read-to-write upgrade,
//!   unlock without a held node, starting a pool without a worker factory
//! - **InterruptedWait**: a blocking wait observed cancellation
//! - **DeadWorker**: a worker context terminated without deregistering
//! - **SpawnFailed**: the OS refused to start a worker thread
//! - **Config**: a strict configuration source could not be parsed

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Negative count or timeout supplied at construction or call time.
    InvalidArgument,
    /// Protocol violation by the caller.
    IllegalState,
    /// A blocking wait returned because cancellation was requested.
    InterruptedWait,
    /// A worker terminated without going through `unregister`.
    DeadWorker,
    /// Spawning an execution context failed.
    SpawnFailed,
    /// Configuration could not be loaded.
    Config,
}

impl ErrorKind {
    /// Returns true for kinds the caller is expected to absorb and retry.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::InterruptedWait | Self::DeadWorker)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "invalid argument",
            Self::IllegalState => "illegal state",
            Self::InterruptedWait => "interrupted wait",
            Self::DeadWorker => "dead worker",
            Self::SpawnFailed => "spawn failed",
            Self::Config => "configuration error",
        };
        f.write_str(name)
    }
}

/// The main error type for this crate.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if a blocking wait was interrupted by cancellation.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::InterruptedWait)
    }

    /// Returns true if this is a caller protocol violation.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self.kind, ErrorKind::IllegalState)
    }

    /// Returns true if an argument was rejected.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidArgument)
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).with_message(detail)
    }

    /// Creates an illegal-state error.
    #[must_use]
    pub fn illegal_state(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState).with_message(detail)
    }

    /// Creates an interrupted-wait error naming the primitive that was waited on.
    #[must_use]
    pub fn interrupted(primitive: &str) -> Self {
        Self::new(ErrorKind::InterruptedWait)
            .with_message(format!("{primitive} wait cancelled"))
    }

    /// Creates a negative-timeout error.
    #[must_use]
    pub fn negative_timeout(primitive: &str, millis: i64) -> Self {
        Self::invalid_argument(format!("{primitive}: negative timeout {millis}ms"))
    }

    /// Creates a dead-worker error for the context `worker`.
    #[must_use]
    pub fn dead_worker(worker: crate::types::ContextId, detail: &str) -> Self {
        Self::new(ErrorKind::DeadWorker).with_message(format!("worker {worker} {detail}"))
    }

    /// Creates a spawn-failed error wrapping the OS error.
    #[must_use]
    pub fn spawn_failed(err: std::io::Error) -> Self {
        Self::new(ErrorKind::SpawnFailed)
            .with_message(format!("failed to spawn worker thread: {err}"))
            .with_source(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::new(ErrorKind::Config)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
