//! Optional tracing integration.
//!
//! With the `tracing-integration` feature enabled the macros below forward
//! to the [`tracing`](https://docs.rs/tracing) crate. Without it they expand
//! to nothing, so call sites never need their own `cfg` guards.
//!
//! ```ignore
//! use crate::tracing_compat::debug;
//!
//! debug!(task = %id, flags = %state, "task finished");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    /// No-op stand-in for `tracing::trace!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __taskward_trace {
        ($($arg:tt)*) => {};
    }

    /// No-op stand-in for `tracing::debug!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __taskward_debug {
        ($($arg:tt)*) => {};
    }

    /// No-op stand-in for `tracing::info!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __taskward_info {
        ($($arg:tt)*) => {};
    }

    /// No-op stand-in for `tracing::warn!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __taskward_warn {
        ($($arg:tt)*) => {};
    }

    /// No-op stand-in for `tracing::error!`.
    #[macro_export]
    #[doc(hidden)]
    macro_rules! __taskward_error {
        ($($arg:tt)*) => {};
    }
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::{
    __taskward_debug as debug, __taskward_error as error, __taskward_info as info,
    __taskward_trace as trace, __taskward_warn as warn,
};
