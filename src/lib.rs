//! Taskward: suspend, resume and cancel background work.
//!
//! # Overview
//!
//! A [`ControlBlock`] owns exactly one dedicated thread and the state machine
//! that governs it: start, suspend, resume, abort and wait. Work running on
//! that thread cooperates by calling [`ControlBlock::pulse`] (the checkpoint)
//! now and then; suspension and cancellation requests are observed there.
//!
//! Work that cannot be taught to call `pulse` is run through the escort
//! guard ([`ControlBlock::disgraceful_wrap`]), which drives an isolated
//! worker from the outside: the worker can be stopped, continued and killed
//! without touching state shared with the rest of the program.
//!
//! Errors raised by a task are captured once and replayed to every waiter.
//!
//! # Module Structure
//!
//! - [`types`]: State flags, cancellation reasons, task identifiers
//! - [`sync`]: The [`Gate`] primitive and multi-gate select
//! - [`task`]: Control block, builder, action and function tasks
//! - [`escort`]: The escort guard behind `disgraceful_wrap`
//! - [`isolate`]: Isolated (forked) workers that can be pre-empted safely
//! - [`completion`]: Wait/result facade for pool-scheduled jobs
//! - [`context`]: Spawn and synchronization-context capabilities
//! - [`config`]: Task configuration
//! - [`error`](mod@error): Error types
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod escort;
pub mod isolate;
pub mod sync;
pub mod task;
pub mod tracing_compat;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use completion::{Completion, fork};
pub use config::{ConfigError, FinishedPanicPolicy, TaskConfig};
pub use context::{Job, Spawn, SyncContext, ThreadSpawner};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use isolate::{IsolatedTask, WorkerError};
pub use sync::Gate;
pub use task::{ActionTask, ControlBlock, FunctionTask, Notification, TaskBody, TaskBuilder};
pub use types::{CancelKind, CancelReason, StateFlags, TaskId};
