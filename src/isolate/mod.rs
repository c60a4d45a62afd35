//! Isolated workers.
//!
//! A thread cannot be stopped or killed from outside without leaving locks,
//! allocators and shared data in an unknown state. Work that must be
//! pre-emptible therefore runs in an isolated worker: on Unix a forked child
//! process that shares nothing mutable with the parent.
//!
//! The control block's thread supervises the worker. While it does, the
//! block's forced tier acts on the worker process:
//!
//! | request              | effect on the worker        |
//! |----------------------|-----------------------------|
//! | `suspend(false)`     | `SIGSTOP`                   |
//! | `resume()`           | `SIGCONT` (last suspension) |
//! | `abort(false, _)`    | `SIGCONT`, then `SIGKILL`   |
//!
//! The worker's value travels back over a pipe as JSON, so `T` must be
//! serializable. A worker killed by a forced abort finishes the block as
//! terminated; any other abnormal exit is a [`ErrorKind::Worker`] failure.
//! Graceful requests are only observed before the worker starts.
//!
//! On platforms without `fork` running an isolated task fails with
//! [`ErrorKind::Unsupported`].

use crate::error::{Error, ErrorKind, Result};
use crate::sync::Gate;
use crate::task::{ControlBlock, FunctionTask, ResultSlot, TaskBody, TaskBuilder};
use crate::types::CancelReason;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error as ThisError;

#[cfg(unix)]
mod unix;

/// A function task whose callable runs in an isolated worker.
pub type IsolatedTask<T> = FunctionTask<T>;

/// Failures of the isolated-worker machinery itself.
#[derive(Debug, ThisError)]
pub enum WorkerError {
    /// A system call failed.
    #[error("{call} failed: {errno}")]
    Sys {
        /// The failing call.
        call: &'static str,
        /// The reported error.
        errno: std::io::Error,
    },
    /// The worker's report could not be decoded.
    #[error("malformed worker report: {0}")]
    Report(#[from] serde_json::Error),
    /// The worker was killed by a signal nobody requested.
    #[error("worker terminated by signal {0}")]
    Signaled(String),
    /// The worker exited without writing a report.
    #[error("worker exited with status {0} without a report")]
    NoReport(i32),
}

impl From<WorkerError> for Error {
    fn from(e: WorkerError) -> Self {
        Self::from_source(ErrorKind::Worker, e)
    }
}

/// What a worker sends back before exiting.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub(crate) enum WorkerReport<T> {
    Completed(T),
    Failed { kind: ErrorKind, message: String },
    Panicked(String),
}

impl<T> WorkerReport<T> {
    pub(crate) fn from_outcome(outcome: std::thread::Result<Result<T>>) -> Self {
        match outcome {
            Ok(Ok(value)) => Self::Completed(value),
            Ok(Err(err)) => Self::Failed {
                kind: err.kind(),
                message: err.context().map_or_else(|| err.to_string(), str::to_string),
            },
            Err(payload) => {
                Self::Panicked(Error::panicked(payload.as_ref()).context().unwrap_or("panic").to_string())
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed { kind, message } => Err(Error::new(kind).with_context(message)),
            Self::Panicked(message) => Err(Error::new(ErrorKind::Panicked).with_context(message)),
        }
    }
}

/// Runs `action` in a fresh isolated worker supervised by `task`.
#[cfg(unix)]
pub(crate) fn run_isolated<T, F>(task: &ControlBlock, action: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    unix::run(task, action)
}

#[cfg(not(unix))]
pub(crate) fn run_isolated<T, F>(_task: &ControlBlock, _action: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    Err(Error::new(ErrorKind::Unsupported).with_context("isolated workers require a Unix platform"))
}

/// Body of an isolated block.
pub(crate) struct IsolatedBody<F, T> {
    action: Option<F>,
    slot: Arc<ResultSlot<T>>,
    start: Option<Gate>,
}

impl<F, T> IsolatedBody<F, T> {
    /// `start`, when given, holds the worker back until it opens.
    pub(crate) fn new(action: F, slot: Arc<ResultSlot<T>>, start: Option<Gate>) -> Self {
        Self {
            action: Some(action),
            slot,
            start,
        }
    }
}

impl<F, T> TaskBody for IsolatedBody<F, T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn run(&mut self, task: &ControlBlock) -> Result<()> {
        if let Some(start) = &self.start {
            start.wait();
        }
        if task.terminate_gate().is_open() {
            let reason = task.forced_abort_reason().unwrap_or_else(CancelReason::requested);
            return Err(Error::canceled(reason));
        }
        let action = self
            .action
            .take()
            .ok_or_else(|| Error::invalid_operation("isolated action already ran"))?;
        let value = run_isolated(task, action)?;
        self.slot.store(value);
        Ok(())
    }
}

impl TaskBuilder {
    /// Creates a task whose callable runs in an isolated worker.
    pub fn isolated<F, T>(self, action: F) -> Result<IsolatedTask<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let slot = ResultSlot::new();
        let block = self.build(IsolatedBody::new(action, Arc::clone(&slot), None))?;
        Ok(FunctionTask::from_parts(block, slot))
    }
}

impl<T> FunctionTask<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Creates an isolated task with the default configuration.
    pub fn isolated<F>(action: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let slot = ResultSlot::new();
        let block = ControlBlock::new(IsolatedBody::new(action, Arc::clone(&slot), None));
        Self::from_parts(block, slot)
    }
}
