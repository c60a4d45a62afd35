//! Error types.
//!
//! Every fallible operation in the crate returns [`Error`]. An error carries
//! an [`ErrorKind`], optional human-readable context, the [`CancelReason`]
//! when it describes a cancellation, and, for aggregates, the list of
//! underlying causes.
//!
//! `Error` is cheap to clone: a task's terminal error is captured once and
//! handed out again on every `wait`.

use crate::types::CancelReason;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Cancellation observed at a checkpoint, a self-abort, or a forced abort.
    Canceled,
    /// A bounded wait expired before the task finished.
    Timeout,
    /// The operation is not allowed in the current state or on this thread.
    InvalidOperation,
    /// The task body reported a failure.
    Failed,
    /// The task body panicked.
    Panicked,
    /// Several independent failures.
    Aggregate,
    /// An isolated worker could not be created, supervised or decoded.
    Worker,
    /// The platform does not support the requested operation.
    Unsupported,
}

impl ErrorKind {
    /// Returns a short description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canceled => "operation canceled",
            Self::Timeout => "wait timed out",
            Self::InvalidOperation => "invalid operation",
            Self::Failed => "task failed",
            Self::Panicked => "task panicked",
            Self::Aggregate => "multiple failures",
            Self::Worker => "isolated worker error",
            Self::Unsupported => "unsupported on this platform",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate-wide error type.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    cancel: Option<CancelReason>,
    causes: Vec<Error>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error of the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            cancel: None,
            causes: Vec::new(),
            source: None,
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn canceled(reason: CancelReason) -> Self {
        Self {
            cancel: Some(reason),
            ..Self::new(ErrorKind::Canceled)
        }
    }

    /// Creates a timeout error for a wait bounded by `after`.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout).with_context(format!("gave up after {after:?}"))
    }

    /// Creates a misuse error.
    #[must_use]
    pub fn invalid_operation(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation).with_context(context)
    }

    /// Creates a failure reported by a task body.
    #[must_use]
    pub fn failed(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed).with_context(context)
    }

    /// Creates an error from a caught panic payload.
    #[must_use]
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        Self::new(ErrorKind::Panicked).with_context(panic_message(payload))
    }

    /// Creates an aggregate of several failures.
    #[must_use]
    pub fn aggregate(causes: Vec<Self>) -> Self {
        Self {
            causes,
            ..Self::new(ErrorKind::Aggregate)
        }
    }

    /// Wraps an arbitrary error as a task failure.
    #[must_use]
    pub fn from_source<E>(kind: ErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            context: Some(source.to_string()),
            source: Some(Arc::new(source)),
            ..Self::new(kind)
        }
    }

    /// Adds context to the error, replacing any previous context.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the cancellation reason for [`ErrorKind::Canceled`] errors.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        self.cancel.as_ref()
    }

    /// Returns the causes of an aggregate error.
    #[must_use]
    pub fn causes(&self) -> &[Self] {
        &self.causes
    }

    /// Returns `true` if this error describes a cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self.kind, ErrorKind::Canceled)
    }

    /// Returns `true` if this error is a wait timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns `true` if this error reports misuse of the API.
    #[must_use]
    pub const fn is_invalid_operation(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidOperation)
    }

    /// Collapses aggregates down to their first logical cause.
    ///
    /// Non-aggregate errors, and aggregates without causes, are returned
    /// unchanged.
    #[must_use]
    pub fn into_root_cause(self) -> Self {
        let mut current = self;
        while current.kind == ErrorKind::Aggregate && !current.causes.is_empty() {
            current = current.causes.swap_remove(0);
        }
        current
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("context", &self.context)
            .field("cancel", &self.cancel)
            .field("causes", &self.causes)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(reason) = &self.cancel {
            write!(f, " ({reason})")?;
        }
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        if !self.causes.is_empty() {
            write!(f, " [")?;
            for (i, cause) in self.causes.iter().enumerate() {
                if i > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{cause}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::from_source(ErrorKind::Failed, err)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension for attaching context to results.
pub trait ResultExt<T> {
    /// Replaces the error context with `ctx`.
    fn context(self, ctx: impl Into<String>) -> Result<T>;

    /// Lazily computes the context only on the error path.
    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(ctx))
    }

    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
