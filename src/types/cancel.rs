//! Cancellation reason and kind types.
//!
//! Cancellation is observed, not silently dropped: whatever path ended a
//! task early, its captured error carries a [`CancelReason`] saying which.

use core::fmt;

/// The kind of cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Another thread opened the terminate gate; observed at a checkpoint.
    Requested,
    /// The task aborted itself from its own thread.
    SelfAbort,
    /// The escort guard killed the isolated worker on behalf of its owner.
    Escort,
    /// A forced abort killed the isolated worker.
    Forced,
}

impl CancelKind {
    /// Returns the severity of this cancellation kind.
    ///
    /// Higher severity cancellations take precedence when strengthening.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::SelfAbort => 1,
            Self::Escort => 2,
            Self::Forced => 3,
        }
    }

    /// Returns true for kinds that involved pre-empting a worker.
    #[must_use]
    pub const fn is_forced(self) -> bool {
        matches!(self, Self::Escort | Self::Forced)
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::SelfAbort => write!(f, "self-abort"),
            Self::Escort => write!(f, "escort"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message.
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Cancellation requested through the terminate gate.
    #[must_use]
    pub const fn requested() -> Self {
        Self::new(CancelKind::Requested)
    }

    /// Cancellation raised by a task against itself.
    #[must_use]
    pub const fn self_abort() -> Self {
        Self::new(CancelKind::SelfAbort)
    }

    /// Cancellation delivered by the escort guard.
    #[must_use]
    pub const fn escort() -> Self {
        Self::new(CancelKind::Escort)
    }

    /// Cancellation delivered by a forced abort.
    #[must_use]
    pub const fn forced() -> Self {
        Self::new(CancelKind::Forced)
    }

    /// Attaches a message.
    #[must_use]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    /// Strengthens this reason with another, keeping the more severe one.
    ///
    /// Returns `true` if the reason was changed.
    pub fn strengthen(&mut self, other: &Self) -> bool {
        if other.kind > self.kind {
            self.kind = other.kind;
            self.message = other.message;
            return true;
        }

        if other.kind < self.kind {
            return false;
        }

        match (self.message, other.message) {
            (None, Some(msg)) => {
                self.message = Some(msg);
                true
            }
            _ => false,
        }
    }

    /// Returns the kind of this cancellation reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::requested()
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}
