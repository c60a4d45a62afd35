//! Synchronization primitives.
//!
//! - [`Gate`]: a thread-safe, waitable open/closed flag, plus
//!   [`Gate::select`] for waiting on several gates at once in priority order.

pub mod gate;

pub use gate::Gate;
