//! Core types shared by every task flavor.
//!
//! - [`state`]: The lifecycle bitset of a control block
//! - [`cancel`]: Cancellation reason and kind types
//! - [`id`]: Task identifiers used in logs and diagnostics

pub mod cancel;
pub mod id;
pub mod state;

pub use cancel::{CancelKind, CancelReason};
pub use id::TaskId;
pub use state::StateFlags;
